use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::task::{Task, TaskId};

/// One entry of the keyed collection. Pending entries are the mutation
/// queue; the rest are the cached copy of the last server listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredTask {
    pub task: Task,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub replay_path: PathBuf,
}

impl LocalStore {
    /// Opens the store under `data_dir`, creating empty files on first
    /// use. Existing data is left alone.
    #[tracing::instrument(skip(data_dir))]
    pub fn initialize(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let replay_path = data_dir.join("replay.request");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")
                .with_context(|| format!("failed to create {}", tasks_path.display()))?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            "opened local store"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            replay_path,
        })
    }

    /// Upserts `task` as a pending mutation. A prior entry with the same
    /// id is overwritten in place.
    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn put(&self, task: &Task) -> anyhow::Result<()> {
        let mut records = self.load_records()?;
        let record = StoredTask {
            task: task.clone(),
            pending: true,
            queued_at: Some(Utc::now()),
        };

        match records.iter_mut().find(|r| r.task.id == task.id) {
            Some(existing) => {
                debug!("overwriting stored snapshot");
                *existing = record;
            }
            None => records.push(record),
        }

        self.save_records(&records)
    }

    /// Every stored task in insertion order.
    #[tracing::instrument(skip(self))]
    pub fn list_all(&self) -> anyhow::Result<Vec<Task>> {
        Ok(self
            .load_records()?
            .into_iter()
            .map(|record| record.task)
            .collect())
    }

    #[tracing::instrument(skip(self))]
    pub fn list_pending(&self) -> anyhow::Result<Vec<StoredTask>> {
        Ok(self
            .load_records()?
            .into_iter()
            .filter(|record| record.pending)
            .collect())
    }

    /// Replaces the cached server listing. Pending entries are kept and
    /// shadow server tasks with the same id.
    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn cache_snapshot(&self, tasks: &[Task]) -> anyhow::Result<()> {
        let mut records: Vec<StoredTask> = self
            .load_records()?
            .into_iter()
            .filter(|record| record.pending)
            .collect();
        let kept = records.len();

        for task in tasks {
            if records.iter().any(|r| r.task.id == task.id) {
                continue;
            }
            records.push(StoredTask {
                task: task.clone(),
                pending: false,
                queued_at: None,
            });
        }

        debug!(pending = kept, total = records.len(), "cached server snapshot");
        self.save_records(&records)
    }

    /// Records that the pending entry `id` reached the server as `synced`.
    #[tracing::instrument(skip(self, synced), fields(id = %id, synced_id = %synced.id))]
    pub fn mark_synced(&self, id: &TaskId, synced: &Task) -> anyhow::Result<()> {
        let mut records = self.load_records()?;
        let idx = records
            .iter()
            .position(|r| &r.task.id == id)
            .ok_or_else(|| anyhow!("task not found in local store: {id}"))?;

        records[idx] = StoredTask {
            task: synced.clone(),
            pending: false,
            queued_at: None,
        };

        if &synced.id != id {
            let mut pos = 0;
            records.retain(|r| {
                let keep = pos == idx || r.task.id != synced.id;
                pos += 1;
                keep
            });
        }

        self.save_records(&records)
    }

    /// Drops the entry for `id`. Returns whether anything was removed.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn remove(&self, id: &TaskId) -> anyhow::Result<bool> {
        let mut records = self.load_records()?;
        let before = records.len();
        records.retain(|r| &r.task.id != id);
        let removed = records.len() != before;
        if removed {
            self.save_records(&records)?;
        }
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    pub fn request_replay(&self) -> anyhow::Result<()> {
        fs::write(&self.replay_path, Utc::now().to_rfc3339())
            .with_context(|| format!("failed writing {}", self.replay_path.display()))
    }

    pub fn replay_requested(&self) -> bool {
        self.replay_path.exists()
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_replay_request(&self) -> anyhow::Result<()> {
        if self.replay_path.exists() {
            fs::remove_file(&self.replay_path)
                .with_context(|| format!("failed removing {}", self.replay_path.display()))?;
        }
        Ok(())
    }

    fn load_records(&self) -> anyhow::Result<Vec<StoredTask>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    fn save_records(&self, records: &[StoredTask]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, records).context("failed to save tasks.data")
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let item: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(item);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, items))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = items.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for item in items {
        let serialized = serde_json::to_string(item)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
