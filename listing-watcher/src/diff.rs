use crate::types::{ItemId, ItemRef};
use std::collections::BTreeSet;
use tracing::debug;

/// Result of comparing a fresh extraction against a source's seen set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    /// Items not seen before, in extraction order.
    pub new_items: Vec<ItemRef>,
    pub updated_seen: BTreeSet<ItemId>,
}

impl Diff {
    pub fn has_new_items(&self) -> bool {
        !self.new_items.is_empty()
    }
}

/// Splits `extracted` into what is new relative to `seen`.
///
/// Items without an id are dropped from both halves of the result. An id
/// listed twice on the same page is reported once.
pub fn diff(seen: &BTreeSet<ItemId>, extracted: &[ItemRef]) -> Diff {
    let mut updated_seen = seen.clone();
    let mut new_items = Vec::new();

    for item in extracted {
        let Some(id) = &item.id else {
            debug!("Skipping item without id: {}", item.link);
            continue;
        };

        if updated_seen.insert(id.clone()) {
            new_items.push(item.clone());
        }
    }

    Diff {
        new_items,
        updated_seen,
    }
}
