pub mod defs;

pub use defs::{Extractor, ItemId, ItemRef, Notifier};
