//! Decides, per mutation, between a network attempt and the local queue.
//!
//! Creates and updates never fail from the caller's point of view: when
//! the oracle says offline, or the request does not succeed, the task
//! snapshot is put in the local store and a deferred replay is requested.
//! Deletes are online-only. Replays are not deduplicated against later
//! successful submissions, and a replayed record the server refuses is
//! dropped rather than retried.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::api::{TaskApi, is_rejection};
use crate::connectivity::Connectivity;
use crate::replay::ReplayScheduler;
use crate::store::LocalStore;
use crate::task::{Task, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueReason {
    Offline,
    NetworkFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(Task),
    Updated(Task),
    Queued { task: Task, reason: QueueReason },
}

#[derive(Debug)]
pub enum SyncError {
    Offline,
    Network(anyhow::Error),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Offline => f.write_str("Cannot delete task while offline"),
            SyncError::Network(err) => write!(f, "Failed to delete task: {err:#}"),
        }
    }
}

impl std::error::Error for SyncError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Server,
    LocalStore,
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub tasks: Vec<Task>,
    pub source: LoadSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Queued id paired with the task as the server now has it.
    pub synced: Vec<(TaskId, Task)>,
    /// Records the server refused, dropped from the queue, with the reason.
    pub rejected: Vec<(Task, String)>,
    pub remaining: usize,
    pub skipped_offline: bool,
}

pub struct SyncCoordinator {
    api: Arc<dyn TaskApi>,
    connectivity: Arc<dyn Connectivity>,
    replay: Arc<dyn ReplayScheduler>,
    store: LocalStore,
}

impl SyncCoordinator {
    pub fn new(
        api: Arc<dyn TaskApi>,
        connectivity: Arc<dyn Connectivity>,
        replay: Arc<dyn ReplayScheduler>,
        store: LocalStore,
    ) -> Self {
        Self {
            api,
            connectivity,
            replay,
            store,
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    #[instrument(skip(self, task), fields(id = %task.id, is_update))]
    pub async fn submit(&self, task: &Task, is_update: bool) -> SubmitOutcome {
        if !self.connectivity.is_online() {
            warn!("offline; saving task locally for later sync");
            self.queue(task).await;
            return SubmitOutcome::Queued {
                task: task.clone(),
                reason: QueueReason::Offline,
            };
        }

        let attempt = if is_update {
            self.api.update(task).await
        } else {
            self.api.create(task).await
        };

        match attempt {
            Ok(server_task) if is_update => {
                info!("task updated on server");
                SubmitOutcome::Updated(server_task)
            }
            Ok(server_task) => {
                info!(server_id = %server_task.id, "task sent to server");
                SubmitOutcome::Created(server_task)
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "failed to submit task to server");
                self.queue(task).await;
                SubmitOutcome::Queued {
                    task: task.clone(),
                    reason: QueueReason::NetworkFailure,
                }
            }
        }
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete(&self, id: &TaskId) -> Result<(), SyncError> {
        if !self.connectivity.is_online() {
            warn!("refusing delete while offline");
            return Err(SyncError::Offline);
        }

        self.api.delete(id).await.map_err(|err| {
            error!(error = %format!("{err:#}"), "failed to delete task");
            SyncError::Network(err)
        })?;

        info!("task deleted");
        if let Err(err) = self.store.remove(id) {
            error!(error = %format!("{err:#}"), "failed to drop deleted task from local store");
        }
        Ok(())
    }

    /// Current task list: the server's when reachable, else the store's.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Loaded {
        if self.connectivity.is_online() {
            match self.api.list().await {
                Ok(tasks) => {
                    if let Err(err) = self.store.cache_snapshot(&tasks) {
                        error!(error = %format!("{err:#}"), "failed caching task list");
                    }
                    return Loaded {
                        tasks,
                        source: LoadSource::Server,
                    };
                }
                Err(err) => {
                    error!(error = %format!("{err:#}"), "failed to load task list from server");
                }
            }
        } else {
            warn!("offline; loading tasks from local store");
        }

        let tasks = self.store.list_all().unwrap_or_else(|err| {
            error!(error = %format!("{err:#}"), "failed reading local store");
            Vec::new()
        });
        Loaded {
            tasks,
            source: LoadSource::LocalStore,
        }
    }

    /// Replays queued snapshots in insertion order. A record the server
    /// refuses (4xx) is dropped from the queue; a transport failure or 5xx
    /// stops the flush and leaves the rest queued.
    #[instrument(skip(self))]
    pub async fn flush_pending(&self) -> anyhow::Result<FlushReport> {
        let mut report = FlushReport::default();
        if !self.connectivity.is_online() {
            debug!("offline; nothing flushed");
            report.skipped_offline = true;
            report.remaining = self.store.list_pending()?.len();
            return Ok(report);
        }

        let pending = self.store.list_pending()?;
        info!(count = pending.len(), "flushing pending tasks");

        for (idx, record) in pending.iter().enumerate() {
            let task = &record.task;
            let attempt = if task.id.is_local() {
                self.api.create(task).await
            } else {
                self.api.update(task).await
            };

            match attempt {
                Ok(server_task) => {
                    if let Err(err) = self.store.mark_synced(&task.id, &server_task) {
                        error!(
                            id = %task.id,
                            error = %format!("{err:#}"),
                            "task reached the server but the local store was not updated"
                        );
                    }
                    report.synced.push((task.id.clone(), server_task));
                }
                Err(err) if is_rejection(&err) => {
                    let reason = format!("{err:#}");
                    warn!(id = %task.id, error = %reason, "server refused queued task; dropping it");
                    if let Err(err) = self.store.remove(&task.id) {
                        error!(error = %format!("{err:#}"), "failed dropping refused task");
                    }
                    report.rejected.push((task.clone(), reason));
                }
                Err(err) => {
                    warn!(
                        id = %task.id,
                        error = %format!("{err:#}"),
                        "replay failed; keeping remaining tasks queued"
                    );
                    report.remaining = pending.len() - idx;
                    return Ok(report);
                }
            }
        }

        if let Err(err) = self.store.clear_replay_request() {
            error!(error = %format!("{err:#}"), "failed clearing replay request");
        }
        info!(
            synced = report.synced.len(),
            rejected = report.rejected.len(),
            "pending tasks flushed"
        );
        Ok(report)
    }

    async fn queue(&self, task: &Task) {
        match self.store.put(task) {
            Ok(()) => info!("task saved locally for offline sync"),
            Err(err) => error!(error = %format!("{err:#}"), "failed saving task locally"),
        }

        match self.replay.register().await {
            Ok(()) => debug!("replay registered"),
            Err(err) => warn!(error = %format!("{err:#}"), "replay registration failed"),
        }
    }
}
