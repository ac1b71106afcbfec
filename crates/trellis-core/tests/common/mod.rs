#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use trellis_core::api::{StatusError, TaskApi};
use trellis_core::connectivity::ConnectivityFlag;
use trellis_core::replay::ReplayScheduler;
use trellis_core::store::LocalStore;
use trellis_core::sync::SyncCoordinator;
use trellis_core::task::{Priority, Status, Task, TaskId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Create(Task),
    Update(Task),
    Delete(TaskId),
}

/// In-memory server that records every request it receives.
#[derive(Default)]
pub struct FakeApi {
    pub calls: Mutex<Vec<Call>>,
    pub tasks: Mutex<Vec<Task>>,
    pub failing: AtomicBool,
    /// Runs after every accepted create.
    pub after_create: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    next_id: AtomicU64,
}

fn status_error(action: &str, status: u16, detail: &str) -> anyhow::Error {
    StatusError {
        action: action.to_string(),
        status,
        detail: detail.to_string(),
    }
    .into()
}

impl FakeApi {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let next = tasks
            .iter()
            .filter_map(|t| match t.id {
                TaskId::Remote(id) => Some(id),
                TaskId::Local(_) => None,
            })
            .max()
            .unwrap_or(0);
        Self {
            tasks: Mutex::new(tasks),
            next_id: AtomicU64::new(next),
            ..Self::default()
        }
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List))
            .collect()
    }

    pub fn on_create(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.after_create.lock() = Some(Box::new(hook));
    }

    fn check(&self, action: &str) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(status_error(action, 500, "Internal Server Error"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TaskApi for FakeApi {
    async fn list(&self) -> anyhow::Result<Vec<Task>> {
        self.calls.lock().push(Call::List);
        self.check("list tasks")?;
        Ok(self.tasks.lock().clone())
    }

    async fn create(&self, task: &Task) -> anyhow::Result<Task> {
        self.calls.lock().push(Call::Create(task.clone()));
        self.check("create task")?;
        if self.tasks.lock().iter().any(|t| t.title == task.title) {
            return Err(status_error("create task", 400, "Task already exists."));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let created = Task {
            id: TaskId::Remote(id),
            ..task.clone()
        };
        self.tasks.lock().push(created.clone());
        if let Some(hook) = self.after_create.lock().as_ref() {
            hook();
        }
        Ok(created)
    }

    async fn update(&self, task: &Task) -> anyhow::Result<Task> {
        self.calls.lock().push(Call::Update(task.clone()));
        self.check("update task")?;
        let mut tasks = self.tasks.lock();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => return Err(status_error("update task", 404, "Task not found")),
        }
        Ok(task.clone())
    }

    async fn delete(&self, id: &TaskId) -> anyhow::Result<()> {
        self.calls.lock().push(Call::Delete(id.clone()));
        self.check("delete task")?;
        self.tasks.lock().retain(|t| &t.id != id);
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingReplay {
    pub registrations: AtomicUsize,
    pub failing: AtomicBool,
}

#[async_trait]
impl ReplayScheduler for CountingReplay {
    async fn register(&self) -> anyhow::Result<()> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("background sync unavailable"));
        }
        Ok(())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub api: Arc<FakeApi>,
    pub flag: Arc<ConnectivityFlag>,
    pub replay: Arc<CountingReplay>,
    pub store: LocalStore,
    pub coordinator: Arc<SyncCoordinator>,
}

impl Harness {
    pub fn new(api: FakeApi, online: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::initialize(dir.path()).expect("store");
        let api = Arc::new(api);
        let flag = Arc::new(ConnectivityFlag::new(online));
        let replay = Arc::new(CountingReplay::default());
        let coordinator = Arc::new(SyncCoordinator::new(
            api.clone(),
            flag.clone(),
            replay.clone(),
            store.clone(),
        ));
        Self {
            dir,
            api,
            flag,
            replay,
            store,
            coordinator,
        }
    }

    pub fn registrations(&self) -> usize {
        self.replay.registrations.load(Ordering::SeqCst)
    }
}

pub fn task(id: u64, title: &str, priority: Priority, status: Status) -> Task {
    Task {
        id: TaskId::Remote(id),
        title: title.to_string(),
        description: String::new(),
        priority,
        status,
    }
}
