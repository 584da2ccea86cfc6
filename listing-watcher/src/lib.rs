pub mod types;
pub mod traits;
pub mod fetcher;
pub mod extractor;
pub mod diff;
pub mod registry;
pub mod digest;
pub mod notifier;
pub mod controller;
pub mod commands;
pub mod config;

pub use types::*;
pub use traits::ContentSource;
pub use fetcher::Fetcher;
pub use extractor::ListingCardExtractor;
pub use diff::{diff, Diff};
pub use registry::{JsonFileStore, RegistryStore, Snapshot, SourceRecord, SourceRegistry};
pub use digest::format_digest;
pub use notifier::{LogNotifier, TelegramNotifier};
pub use controller::{ControllerConfig, PollController};
pub use commands::{dispatch, handle_line, Command};
pub use config::{Args, WatcherConfig};
