#![allow(dead_code)]

use async_trait::async_trait;
use listing_watcher::{
    ContentSource, ControllerConfig, Extractor, ItemId, ItemRef, Notifier, PollController,
    RegistryStore, Result, Snapshot, SourceRecord, SourceRegistry, WatcherError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::sync::Semaphore;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Serves canned pages keyed by endpoint; unknown endpoints fail.
#[derive(Default)]
pub struct FakeSource {
    pages: Mutex<HashMap<String, std::result::Result<String, String>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch waits for a permit on `gate` before answering.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn set_page(&self, endpoint: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Ok(body.to_string()));
    }

    pub fn set_failure(&self, endpoint: &str, cause: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Err(cause.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn fetch(&self, endpoint: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }

        let page = self.pages.lock().unwrap().get(endpoint).cloned();
        match page {
            Some(Ok(body)) => Ok(body),
            Some(Err(cause)) => Err(WatcherError::Fetch {
                endpoint: endpoint.to_string(),
                cause,
            }),
            None => Err(WatcherError::Fetch {
                endpoint: endpoint.to_string(),
                cause: "HTTP 404: Not Found".to_string(),
            }),
        }
    }
}

/// Reads one item per line as `<id> <link>`; a `?` id means "no id".
/// Pages starting with `BROKEN` fail and pages starting with `PANIC` panic.
pub struct LineExtractor;

impl Extractor for LineExtractor {
    fn extract(&self, content: &str) -> anyhow::Result<Vec<ItemRef>> {
        if content.starts_with("PANIC") {
            panic!("extractor blew up");
        }
        if content.starts_with("BROKEN") {
            anyhow::bail!("unparsable page");
        }

        Ok(content
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let id = parts.next()?;
                let link = parts.next().unwrap_or_default();
                Some(match id.parse::<u64>() {
                    Ok(n) => ItemRef::new(n, link),
                    Err(_) => ItemRef::unidentified(link),
                })
            })
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: AtomicBool,
    panic: AtomicBool,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn fail_deliveries(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn panic_on_delivery(&self, panic: bool) {
        self.panic.store(panic, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        if self.panic.load(Ordering::SeqCst) {
            panic!("notifier blew up");
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("chat unavailable");
        }
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// In-memory store that can be told to reject saves.
#[derive(Clone, Default)]
pub struct MemoryStore {
    snapshot: Arc<Mutex<Snapshot>>,
    fail_saves: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
    save_gate: Option<Arc<Semaphore>>,
}

impl MemoryStore {
    pub fn with_sources(sources: &[(&str, &str, Vec<u64>)]) -> Self {
        let snapshot: Snapshot = sources
            .iter()
            .map(|(id, endpoint, ids)| {
                (
                    id.to_string(),
                    SourceRecord {
                        endpoint: endpoint.to_string(),
                        ids: ids.iter().map(|n| ItemId::Number(*n)).collect(),
                    },
                )
            })
            .collect();

        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
            ..Self::default()
        }
    }

    /// Every save waits for a permit on `gate` before writing.
    pub fn gate_saves(mut self, gate: Arc<Semaphore>) -> Self {
        self.save_gate = Some(gate);
        self
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Snapshot {
        self.snapshot.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn load(&self) -> Result<Snapshot> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(gate) = &self.save_gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(WatcherError::Persistence("disk full".to_string()));
        }
        *self.snapshot.lock().unwrap() = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn ids(values: &[u64]) -> std::collections::BTreeSet<ItemId> {
    values.iter().map(|n| ItemId::Number(*n)).collect()
}

pub struct Harness {
    pub controller: PollController,
    pub registry: Arc<SourceRegistry>,
    pub source: Arc<FakeSource>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: MemoryStore,
}

pub async fn harness(store: MemoryStore, source: FakeSource, interval_ms: u64) -> Harness {
    init_tracing();

    let registry = Arc::new(SourceRegistry::load(store.clone()).await.unwrap());
    let source = Arc::new(source);
    let notifier = Arc::new(RecordingNotifier::default());

    let controller = PollController::new(
        registry.clone(),
        source.clone(),
        Arc::new(LineExtractor),
        notifier.clone(),
        ControllerConfig {
            interval_ms,
            notify_delay_ms: 0,
        },
    )
    .unwrap();

    Harness {
        controller,
        registry,
        source,
        notifier,
        store,
    }
}
