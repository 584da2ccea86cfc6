use crate::diff::diff;
use crate::digest::format_digest;
use crate::registry::SourceRegistry;
use crate::traits::ContentSource;
use crate::types::{
    Extractor, LoopStatus, Notifier, Result, RoundReport, Source, SourceOutcome, SourceReport,
    Statistics, WatcherError,
};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub interval_ms: u64,
    /// Pause before each digest is sent, to stay under chat rate limits.
    pub notify_delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            notify_delay_ms: 2000,
        }
    }
}

#[derive(Debug)]
struct LoopState {
    running: bool,
    interval_ms: u64,
    /// A loop task exists, possibly finishing its last round after a stop.
    worker_active: bool,
}

struct Inner {
    registry: Arc<SourceRegistry>,
    source: Arc<dyn ContentSource>,
    extractor: Arc<dyn Extractor>,
    notifier: Arc<dyn Notifier>,
    notify_delay: Duration,
    state: Mutex<LoopState>,
    round_lock: Mutex<()>,
    wake: Notify,
    worker_tx: watch::Sender<bool>,
}

/// Drives polling rounds over every registered source.
///
/// Cheap to clone; all clones control the same loop.
#[derive(Clone)]
pub struct PollController {
    inner: Arc<Inner>,
}

impl PollController {
    pub fn new(
        registry: Arc<SourceRegistry>,
        source: Arc<dyn ContentSource>,
        extractor: Arc<dyn Extractor>,
        notifier: Arc<dyn Notifier>,
        config: ControllerConfig,
    ) -> Result<Self> {
        if config.interval_ms == 0 {
            return Err(WatcherError::Config(
                "Polling interval must be a positive number of milliseconds".to_string(),
            ));
        }

        let (worker_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                source,
                extractor,
                notifier,
                notify_delay: Duration::from_millis(config.notify_delay_ms),
                state: Mutex::new(LoopState {
                    running: false,
                    interval_ms: config.interval_ms,
                    worker_active: false,
                }),
                round_lock: Mutex::new(()),
                wake: Notify::new(),
                worker_tx,
            }),
        })
    }

    pub async fn start(&self) -> String {
        let mut state = self.inner.state.lock().await;
        if state.running {
            warn!("Parsing is already running");
            return "Parsing is already running".to_string();
        }
        state.running = true;

        // A loop still finishing its last round picks the flag back up.
        if !state.worker_active {
            state.worker_active = true;
            self.inner.worker_tx.send_replace(true);
            let inner = self.inner.clone();
            tokio::spawn(async move { inner.supervise().await });
        }

        info!("Parsing started");
        "Parsing started".to_string()
    }

    /// Asks the loop to stop after the round in flight, if any.
    pub async fn stop(&self) -> String {
        let mut state = self.inner.state.lock().await;
        if !state.running {
            warn!("Parsing is not running");
            return "Parsing is not running".to_string();
        }
        state.running = false;
        drop(state);

        self.inner.wake.notify_one();
        info!("Parsing stopped");
        "Parsing stopped".to_string()
    }

    pub async fn status(&self) -> LoopStatus {
        if self.inner.state.lock().await.running {
            LoopStatus::Running
        } else {
            LoopStatus::Stopped
        }
    }

    /// Changes the pause between rounds. Applies from the next pause on.
    pub async fn set_interval(&self, interval_ms: u64) -> Result<String> {
        if interval_ms == 0 {
            return Err(WatcherError::InvalidCommand(
                "Interval must be a positive number of milliseconds".to_string(),
            ));
        }

        self.inner.state.lock().await.interval_ms = interval_ms;
        info!("Interval set to {} ms", interval_ms);
        Ok(format!("Interval set to {} ms", interval_ms))
    }

    pub async fn interval_ms(&self) -> u64 {
        self.inner.state.lock().await.interval_ms
    }

    pub async fn statistics(&self) -> Statistics {
        self.inner.registry.stats().await
    }

    /// Runs one round right away. Waits if another round is in flight.
    pub async fn run_round(&self) -> RoundReport {
        self.inner.run_round().await
    }

    /// Resolves once no loop task is alive.
    pub async fn wait_stopped(&self) {
        let mut worker = self.inner.worker_tx.subscribe();
        let _ = worker.wait_for(|active| !*active).await;
    }
}

impl Inner {
    /// Runs the loop task. If it panics, the controller is left stopped.
    async fn supervise(self: Arc<Self>) {
        let worker = tokio::spawn(self.clone().run_loop());
        if let Err(e) = worker.await {
            error!("Poll loop aborted: {}", e);
            let mut state = self.state.lock().await;
            state.running = false;
            state.worker_active = false;
            self.worker_tx.send_replace(false);
        }
    }

    async fn run_loop(self: Arc<Self>) {
        info!("Poll loop started");

        while self.keep_running().await.is_some() {
            let report = self.run_round().await;
            debug!("Round finished: {}", report);

            let Some(interval_ms) = self.keep_running().await else {
                break;
            };
            self.rest(Duration::from_millis(interval_ms)).await;
        }

        info!("Parsing has been stopped");
    }

    /// Returns the current interval while running; otherwise retires this
    /// loop task.
    async fn keep_running(&self) -> Option<u64> {
        let mut state = self.state.lock().await;
        if state.running {
            return Some(state.interval_ms);
        }
        state.worker_active = false;
        self.worker_tx.send_replace(false);
        None
    }

    async fn rest(&self, interval: Duration) {
        let deadline = Instant::now() + interval;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                _ = self.wake.notified() => {
                    if !self.state.lock().await.running {
                        return;
                    }
                }
            }
        }
    }

    async fn run_round(self: &Arc<Self>) -> RoundReport {
        let _round = self.round_lock.lock().await;
        let started_at = Utc::now();

        let sources = self.registry.snapshot().await;
        info!("Starting parsing iteration over {} sources", sources.len());

        let (source_ids, tasks): (Vec<_>, Vec<_>) = sources
            .into_iter()
            .map(|source| {
                let inner = self.clone();
                let source_id = source.id.clone();
                (source_id, tokio::spawn(async move { inner.poll_source(&source).await }))
            })
            .unzip();

        let reports = source_ids
            .into_iter()
            .zip(join_all(tasks).await)
            .map(|(source_id, joined)| match joined {
                Ok(report) => report,
                Err(e) => {
                    error!("Polling site #{} aborted: {}", source_id, e);
                    SourceReport {
                        source_id,
                        outcome: SourceOutcome::Failed(format!("Polling aborted: {}", e)),
                    }
                }
            })
            .collect();

        let mut report = RoundReport {
            started_at,
            finished_at: started_at,
            sources: reports,
            committed: false,
            notified: 0,
        };

        if report.needs_commit() {
            match self.registry.commit(report.commit_set()).await {
                Ok(()) => {
                    report.committed = true;
                    report.notified = self.notify_fresh(&report.sources).await;
                }
                Err(e) => {
                    error!("Failed to persist round results, skipping notifications: {}", e);
                }
            }
        }

        report.finished_at = Utc::now();
        info!("Parsing iteration finished: {}", report);
        report
    }

    async fn poll_source(&self, source: &Source) -> SourceReport {
        let outcome = match self.process_source(source).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error polling site #{}: {}", source.id, e);
                SourceOutcome::Failed(e.to_string())
            }
        };

        SourceReport {
            source_id: source.id.clone(),
            outcome,
        }
    }

    async fn process_source(&self, source: &Source) -> Result<SourceOutcome> {
        let content = self.source.fetch(&source.endpoint).await?;
        debug!("Site #{} fetched successfully", source.id);

        let extracted = self
            .extractor
            .extract(&content)
            .map_err(|e| WatcherError::Extraction(e.to_string()))?;

        if extracted.is_empty() {
            warn!("No offers found on site #{}", source.id);
            return Ok(SourceOutcome::Empty);
        }

        let diff = diff(&source.seen_ids, &extracted);
        if !diff.has_new_items() {
            return Ok(SourceOutcome::Unchanged);
        }

        info!("Site #{}: {} new offers", source.id, diff.new_items.len());
        Ok(SourceOutcome::Fresh {
            new_items: diff.new_items,
            updated_seen: diff.updated_seen,
        })
    }

    async fn notify_fresh(&self, reports: &[SourceReport]) -> usize {
        let mut delivered = 0;

        for report in reports {
            let SourceOutcome::Fresh { new_items, .. } = &report.outcome else {
                continue;
            };

            if !self.notify_delay.is_zero() {
                tokio::time::sleep(self.notify_delay).await;
            }

            let message = format_digest(&report.source_id, new_items);
            match self
                .notifier
                .notify(&message)
                .await
                .map_err(|e| WatcherError::Notification(e.to_string()))
            {
                Ok(()) => delivered += 1,
                Err(e) => error!("Site #{}: {}", report.source_id, e),
            }
        }

        delivered
    }
}
