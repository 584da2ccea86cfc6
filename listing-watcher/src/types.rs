use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub use interfaces::defs::{Extractor, ItemId, ItemRef, Notifier};

/// Key of a configured listing page in the registry.
pub type SourceId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: SourceId,
    pub endpoint: String,
    pub seen_ids: BTreeSet<ItemId>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_body_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "listing-watcher/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_ms: 1000,
            max_body_mb: 10,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub source_count: usize,
    pub total_id_count: usize,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parser statistics:\nSites parsed: {}\nTotal IDs found: {}",
            self.source_count, self.total_id_count
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Running,
    Stopped,
}

impl fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopStatus::Running => f.write_str("Parsing is running"),
            LoopStatus::Stopped => f.write_str("Parsing is stopped"),
        }
    }
}

/// What happened to one source during a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// New items were found; `updated_seen` is the proposed seen set.
    Fresh {
        new_items: Vec<ItemRef>,
        updated_seen: BTreeSet<ItemId>,
    },
    Unchanged,
    /// The page was fetched but no items were found on it.
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source_id: SourceId,
    pub outcome: SourceOutcome,
}

#[derive(Debug, Clone)]
pub struct RoundReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub committed: bool,
    pub notified: usize,
}

impl RoundReport {
    pub fn needs_commit(&self) -> bool {
        self.sources
            .iter()
            .any(|report| matches!(report.outcome, SourceOutcome::Fresh { .. }))
    }

    /// Proposed seen sets of every source that found something new.
    pub fn commit_set(&self) -> BTreeMap<SourceId, BTreeSet<ItemId>> {
        self.sources
            .iter()
            .filter_map(|report| match &report.outcome {
                SourceOutcome::Fresh { updated_seen, .. } => {
                    Some((report.source_id.clone(), updated_seen.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn new_item_count(&self) -> usize {
        self.sources
            .iter()
            .map(|report| match &report.outcome {
                SourceOutcome::Fresh { new_items, .. } => new_items.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn failed_count(&self) -> usize {
        self.sources
            .iter()
            .filter(|report| matches!(report.outcome, SourceOutcome::Failed(_)))
            .count()
    }

    pub fn outcome_for(&self, source_id: &str) -> Option<&SourceOutcome> {
        self.sources
            .iter()
            .find(|report| report.source_id == source_id)
            .map(|report| &report.outcome)
    }
}

impl fmt::Display for RoundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sources, {} new items, {} failed, committed: {}, notified: {} ({} ms)",
            self.sources.len(),
            self.new_item_count(),
            self.failed_count(),
            self.committed,
            self.notified,
            (self.finished_at - self.started_at).num_milliseconds()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Fetch error for {endpoint}: {cause}")]
    Fetch { endpoint: String, cause: String },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, WatcherError>;
