use crate::types::{ItemId, Result, Source, SourceId, Statistics, WatcherError};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use url::Url;

/// On-disk form of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(rename = "href", alias = "endpoint")]
    pub endpoint: String,
    #[serde(rename = "ids", alias = "idsSeen", default, deserialize_with = "deserialize_ids")]
    pub ids: Vec<ItemId>,
}

/// The whole registry as it is persisted.
pub type Snapshot = BTreeMap<SourceId, SourceRecord>;

// Older registry files recorded underivable ids as null.
fn deserialize_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<ItemId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Option<ItemId>> = Vec::deserialize(deserializer)?;
    Ok(raw.into_iter().flatten().collect())
}

/// Durable backing for the registry. Every save replaces the whole snapshot.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn load(&self) -> Result<Snapshot>;
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Stores the registry as a pretty-printed JSON object.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "registry.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RegistryStore for JsonFileStore {
    async fn load(&self) -> Result<Snapshot> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            WatcherError::Persistence(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            WatcherError::Persistence(format!("Malformed registry {}: {}", self.path.display(), e))
        })
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| WatcherError::Persistence(format!("Failed to serialize registry: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                WatcherError::Persistence(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        // Write next to the target and swap, so readers never see a torn file.
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, json).await.map_err(|e| {
            WatcherError::Persistence(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;
        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            WatcherError::Persistence(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        debug!("Wrote registry to {}", self.path.display());
        Ok(())
    }
}

/// Owner of every source's seen set.
///
/// Readers get cloned snapshots; the only mutation is [`commit`](Self::commit),
/// which persists first and swaps in-memory state only on success.
pub struct SourceRegistry {
    sources: RwLock<BTreeMap<SourceId, Source>>,
    store: Box<dyn RegistryStore>,
    commit_lock: Mutex<()>,
}

impl SourceRegistry {
    pub async fn load(store: impl RegistryStore + 'static) -> Result<Self> {
        let snapshot = store.load().await?;

        let mut sources = BTreeMap::new();
        for (id, record) in snapshot {
            validate_endpoint(&id, &record.endpoint)?;
            sources.insert(
                id.clone(),
                Source {
                    id,
                    endpoint: record.endpoint,
                    seen_ids: record.ids.into_iter().collect(),
                },
            );
        }

        let registry = Self {
            sources: RwLock::new(sources),
            store: Box::new(store),
            commit_lock: Mutex::new(()),
        };
        let stats = registry.stats().await;
        info!(
            "Loaded registry: {} sources, {} seen ids",
            stats.source_count, stats.total_id_count
        );
        Ok(registry)
    }

    pub async fn snapshot(&self) -> Vec<Source> {
        self.sources.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<Source> {
        self.sources.read().await.get(id).cloned()
    }

    /// Folds `updates` into the seen sets and persists the full registry.
    ///
    /// All-or-nothing: an unknown source or a failed save leaves both the
    /// in-memory state and the store untouched.
    pub async fn commit(&self, updates: BTreeMap<SourceId, BTreeSet<ItemId>>) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        // Readers stay unblocked during the save; commits queue on commit_lock.
        let _commit = self.commit_lock.lock().await;
        let mut next = self.sources.read().await.clone();

        if let Some(unknown) = updates.keys().find(|id| !next.contains_key(*id)) {
            return Err(WatcherError::Persistence(format!(
                "Cannot commit ids for unknown source #{}",
                unknown
            )));
        }

        let updated = updates.len();
        for (id, ids) in updates {
            if let Some(source) = next.get_mut(&id) {
                source.seen_ids.extend(ids);
            }
        }

        self.store.save(&to_snapshot(&next)).await?;
        *self.sources.write().await = next;

        info!("Registry updated ({} sources changed)", updated);
        Ok(())
    }

    pub async fn stats(&self) -> Statistics {
        let sources = self.sources.read().await;
        Statistics {
            source_count: sources.len(),
            total_id_count: sources.values().map(|s| s.seen_ids.len()).sum(),
        }
    }
}

fn to_snapshot(sources: &BTreeMap<SourceId, Source>) -> Snapshot {
    sources
        .iter()
        .map(|(id, source)| {
            (
                id.clone(),
                SourceRecord {
                    endpoint: source.endpoint.clone(),
                    ids: source.seen_ids.iter().cloned().collect(),
                },
            )
        })
        .collect()
}

fn validate_endpoint(id: &str, endpoint: &str) -> Result<()> {
    let parsed = Url::parse(endpoint).map_err(|e| {
        WatcherError::Persistence(format!("Source #{} has an invalid endpoint {}: {}", id, endpoint, e))
    })?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host().is_none() {
        return Err(WatcherError::Persistence(format!(
            "Source #{} endpoint {} is not an http(s) URL",
            id, endpoint
        )));
    }

    Ok(())
}
