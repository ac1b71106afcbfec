use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};

use crate::connectivity::{ConnectivityFlag, ConnectivityProbe};
use crate::store::LocalStore;
use crate::sync::{FlushReport, SyncCoordinator};

/// Facility asked to flush pending tasks once connectivity returns.
/// Callers do not observe when, or whether, the replay happens.
#[async_trait]
pub trait ReplayScheduler: Send + Sync {
    async fn register(&self) -> anyhow::Result<()>;
}

/// Registers replays as a marker file next to the queue, so a later
/// `sync` or a running `watch` picks them up.
#[derive(Debug, Clone)]
pub struct StoreReplayScheduler {
    store: LocalStore,
}

impl StoreReplayScheduler {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReplayScheduler for StoreReplayScheduler {
    async fn register(&self) -> anyhow::Result<()> {
        self.store.request_replay()
    }
}

/// Polls connectivity and flushes the queue when the server is back.
pub struct ReplayWorker {
    coordinator: Arc<SyncCoordinator>,
    flag: Arc<ConnectivityFlag>,
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
}

impl ReplayWorker {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        flag: Arc<ConnectivityFlag>,
        probe: Arc<dyn ConnectivityProbe>,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            flag,
            probe,
            interval,
        }
    }

    /// One probe-then-flush round. `None` when there was nothing to do.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> anyhow::Result<Option<FlushReport>> {
        if !self.flag.refresh(self.probe.as_ref()).await {
            debug!("still offline");
            return Ok(None);
        }

        let store = self.coordinator.store();
        if !store.replay_requested() && store.list_pending()?.is_empty() {
            return Ok(None);
        }

        self.coordinator.flush_pending().await.map(Some)
    }

    /// Ticks on the configured interval until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(interval_secs = self.interval.as_secs(), "replay worker started");
        let mut ticker = tokio::time::interval(self.interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("replay worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(Some(report)) => info!(
                            synced = report.synced.len(),
                            remaining = report.remaining,
                            "replay round finished"
                        ),
                        Ok(None) => {}
                        Err(err) => error!(error = %format!("{err:#}"), "replay round failed"),
                    }
                }
            }
        }
    }
}
