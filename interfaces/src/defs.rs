use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifier of a discovered item, as defined by the source it came from.
///
/// Listing sites mostly hand out numeric ids, so those stay numbers on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Number(n) => write!(f, "{}", n),
            ItemId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        ItemId::Number(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        ItemId::Text(value.to_owned())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        ItemId::Text(value)
    }
}

/// One item found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    /// `None` when the page did not carry a usable id for this item.
    pub id: Option<ItemId>,
    pub link: String,
}

impl ItemRef {
    pub fn new(id: impl Into<ItemId>, link: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            link: link.into(),
        }
    }

    pub fn unidentified(link: impl Into<String>) -> Self {
        Self {
            id: None,
            link: link.into(),
        }
    }
}

// Object style note:
// Extractors and notifiers are collaborators handed to the poller at
// construction time. They hold their own configuration (base url, chat id)
// and are shared between concurrently running source pipelines, hence the
// Send + Sync bounds.

/// Turns raw page content into the items it lists.
///
/// A valid page without items yields an empty vec, not an error.
pub trait Extractor: Send + Sync {
    fn extract(&self, content: &str) -> Result<Vec<ItemRef>>;
}

/// Delivers a human-readable message to wherever the operator reads it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}
