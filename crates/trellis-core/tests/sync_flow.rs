mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{Call, FakeApi, Harness, task};
use trellis_core::connectivity::{Connectivity, ConnectivityProbe};
use trellis_core::replay::ReplayWorker;
use trellis_core::store::LocalStore;
use trellis_core::sync::{LoadSource, QueueReason, SubmitOutcome, SyncError};
use trellis_core::task::{Priority, Status, Task, TaskId};

#[tokio::test]
async fn offline_submit_is_stored_and_never_sent() {
    let h = Harness::new(FakeApi::default(), false);
    let fix = task(5, "Fix bug", Priority::High, Status::Todo);

    let outcome = h.coordinator.submit(&fix, true).await;

    assert_eq!(
        outcome,
        SubmitOutcome::Queued {
            task: fix.clone(),
            reason: QueueReason::Offline,
        }
    );
    assert_eq!(h.store.list_all().expect("list"), vec![fix]);
    assert!(h.api.calls().is_empty());
    assert_eq!(h.registrations(), 1);
}

#[tokio::test]
async fn network_failure_falls_back_to_the_queue() {
    let api = FakeApi::with_tasks(vec![task(1, "Ship", Priority::Low, Status::Todo)]);
    api.fail(true);
    let h = Harness::new(api, true);

    let edited = task(1, "Ship it", Priority::Urgent, Status::InProgress);
    let outcome = h.coordinator.submit(&edited, true).await;

    assert!(matches!(
        outcome,
        SubmitOutcome::Queued {
            reason: QueueReason::NetworkFailure,
            ..
        }
    ));
    assert_eq!(h.api.mutations(), vec![Call::Update(edited.clone())]);
    let pending = h.store.list_pending().expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task, edited);
    assert_eq!(h.registrations(), 1);
}

#[tokio::test]
async fn replay_registration_failure_is_not_escalated() {
    let h = Harness::new(FakeApi::default(), false);
    h.replay.failing.store(true, Ordering::SeqCst);

    let outcome = h
        .coordinator
        .submit(&task(2, "Later", Priority::Low, Status::Todo), true)
        .await;

    assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
    assert_eq!(h.store.list_pending().expect("pending").len(), 1);
}

#[tokio::test]
async fn online_create_returns_server_identity() {
    let h = Harness::new(FakeApi::default(), true);
    let draft = Task::new_local("New card".to_string(), Priority::Medium, Status::Todo);

    let outcome = h.coordinator.submit(&draft, false).await;

    let SubmitOutcome::Created(created) = outcome else {
        panic!("expected create, got {outcome:?}");
    };
    assert_eq!(created.id, TaskId::Remote(1));
    assert_eq!(created.title, "New card");
    assert!(h.store.list_all().expect("list").is_empty());
    assert_eq!(h.registrations(), 0);
}

#[tokio::test]
async fn delete_requires_connectivity() {
    let api = FakeApi::with_tasks(vec![task(9, "Old", Priority::Low, Status::Complete)]);
    let h = Harness::new(api, false);

    let err = h
        .coordinator
        .delete(&TaskId::Remote(9))
        .await
        .expect_err("offline delete must fail");
    assert!(matches!(err, SyncError::Offline));
    assert_eq!(err.to_string(), "Cannot delete task while offline");
    assert!(h.api.calls().is_empty());

    h.flag.set_online(true);
    h.api.fail(true);
    let err = h
        .coordinator
        .delete(&TaskId::Remote(9))
        .await
        .expect_err("server failure must surface");
    assert!(matches!(err, SyncError::Network(_)));
    assert!(h.store.list_pending().expect("pending").is_empty());

    h.api.fail(false);
    h.coordinator
        .delete(&TaskId::Remote(9))
        .await
        .expect("online delete");
    assert!(h.api.tasks.lock().is_empty());
}

#[tokio::test]
async fn load_prefers_server_and_falls_back_to_store() {
    let api = FakeApi::with_tasks(vec![
        task(1, "A", Priority::Urgent, Status::Todo),
        task(2, "B", Priority::Low, Status::Todo),
    ]);
    let h = Harness::new(api, true);

    let loaded = h.coordinator.load().await;
    assert_eq!(loaded.source, LoadSource::Server);
    assert_eq!(loaded.tasks.len(), 2);
    assert_eq!(h.store.list_all().expect("cache").len(), 2);

    h.api.fail(true);
    let loaded = h.coordinator.load().await;
    assert_eq!(loaded.source, LoadSource::LocalStore);
    assert_eq!(loaded.tasks.len(), 2);

    h.flag.set_online(false);
    let calls_before = h.api.calls().len();
    let loaded = h.coordinator.load().await;
    assert_eq!(loaded.source, LoadSource::LocalStore);
    assert_eq!(h.api.calls().len(), calls_before);
}

#[tokio::test]
async fn flush_replays_creates_and_updates_in_order() {
    let api = FakeApi::with_tasks(vec![task(3, "Existing", Priority::Low, Status::Todo)]);
    let h = Harness::new(api, false);

    let offline_new = Task::new_local("Made offline".to_string(), Priority::High, Status::Todo);
    let offline_edit = task(3, "Existing, edited", Priority::Medium, Status::InReview);
    h.coordinator.submit(&offline_new, false).await;
    h.coordinator.submit(&offline_edit, true).await;

    let skipped = h.coordinator.flush_pending().await.expect("flush offline");
    assert!(skipped.skipped_offline);
    assert_eq!(skipped.remaining, 2);
    assert!(h.api.calls().is_empty());

    h.flag.set_online(true);
    let report = h.coordinator.flush_pending().await.expect("flush");
    assert_eq!(report.remaining, 0);
    assert_eq!(report.synced.len(), 2);
    assert_eq!(report.synced[0].0, offline_new.id);
    assert_eq!(report.synced[0].1.id, TaskId::Remote(4));

    assert_eq!(
        h.api.mutations(),
        vec![Call::Create(offline_new), Call::Update(offline_edit)]
    );
    assert!(h.store.list_pending().expect("pending").is_empty());
    assert!(!h.store.replay_requested());
}

#[tokio::test]
async fn flush_stops_at_first_server_error() {
    let h = Harness::new(FakeApi::default(), false);
    h.coordinator
        .submit(&task(1, "one", Priority::Low, Status::Todo), true)
        .await;
    h.coordinator
        .submit(&task(2, "two", Priority::Low, Status::Todo), true)
        .await;
    h.store.request_replay().expect("request");

    h.flag.set_online(true);
    h.api.fail(true);
    let report = h.coordinator.flush_pending().await.expect("flush");
    assert!(report.synced.is_empty());
    assert!(report.rejected.is_empty());
    assert_eq!(report.remaining, 2);
    assert_eq!(h.api.mutations().len(), 1);
    assert!(h.store.replay_requested());
}

#[tokio::test]
async fn refused_records_are_dropped_and_the_rest_delivered() {
    let api = FakeApi::with_tasks(vec![task(2, "two", Priority::Low, Status::Todo)]);
    let h = Harness::new(api, false);

    let duplicate = Task::new_local("two".to_string(), Priority::High, Status::Todo);
    let gone = task(1, "deleted elsewhere", Priority::Low, Status::Todo);
    let edited = task(2, "two, edited", Priority::Medium, Status::InProgress);
    h.coordinator.submit(&duplicate, false).await;
    h.coordinator.submit(&gone, true).await;
    h.coordinator.submit(&edited, true).await;

    h.flag.set_online(true);
    let report = h.coordinator.flush_pending().await.expect("flush");

    assert_eq!(report.remaining, 0);
    assert_eq!(report.synced, vec![(edited.id.clone(), edited.clone())]);
    let refused: Vec<TaskId> = report.rejected.iter().map(|(t, _)| t.id.clone()).collect();
    assert_eq!(refused, vec![duplicate.id.clone(), gone.id.clone()]);
    assert!(report.rejected[1].1.contains("404"));

    assert!(h.api.tasks.lock().contains(&edited));
    assert!(h.store.list_pending().expect("pending").is_empty());

    let sent = h.api.mutations().len();
    let again = h.coordinator.flush_pending().await.expect("second flush");
    assert!(again.synced.is_empty() && again.rejected.is_empty());
    assert_eq!(h.api.mutations().len(), sent);
}

#[tokio::test]
async fn store_failure_after_accepted_create_is_not_escalated() {
    let h = Harness::new(FakeApi::default(), false);
    let first = Task::new_local("first".to_string(), Priority::Low, Status::Todo);
    let second = Task::new_local("second".to_string(), Priority::Low, Status::Todo);
    h.coordinator.submit(&first, false).await;
    h.coordinator.submit(&second, false).await;

    let tasks_path = h.store.tasks_path.clone();
    h.api.on_create(move || {
        if tasks_path.is_file() {
            std::fs::remove_file(&tasks_path).expect("remove tasks file");
            std::fs::create_dir(&tasks_path).expect("block tasks file");
        }
    });

    h.flag.set_online(true);
    let report = h.coordinator.flush_pending().await.expect("flush");

    assert_eq!(report.remaining, 0);
    let queued: Vec<TaskId> = report.synced.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(queued, vec![first.id, second.id]);
    assert_eq!(h.api.tasks.lock().len(), 2);
}

struct Switch(AtomicBool);

#[async_trait]
impl ConnectivityProbe for Switch {
    async fn probe(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn replay_worker_flushes_once_server_is_back() {
    let api = FakeApi::with_tasks(vec![task(1, "Ship", Priority::Low, Status::Todo)]);
    let h = Harness::new(api, false);
    let edited = task(1, "Ship", Priority::High, Status::Complete);
    h.coordinator.submit(&edited, true).await;

    let probe = Arc::new(Switch(AtomicBool::new(false)));
    let worker = ReplayWorker::new(
        h.coordinator.clone(),
        h.flag.clone(),
        probe.clone(),
        Duration::from_secs(1),
    );

    assert!(worker.tick().await.expect("tick").is_none());
    assert!(h.api.calls().is_empty());

    probe.0.store(true, Ordering::SeqCst);
    let report = worker.tick().await.expect("tick").expect("flushed");
    assert!(h.flag.is_online());
    assert_eq!(report.synced.len(), 1);
    assert_eq!(h.api.mutations(), vec![Call::Update(edited)]);

    assert!(worker.tick().await.expect("tick").is_none());
}

#[tokio::test]
async fn replay_worker_stops_on_shutdown() {
    let h = Harness::new(FakeApi::default(), false);
    let worker = ReplayWorker::new(
        h.coordinator.clone(),
        h.flag.clone(),
        Arc::new(Switch(AtomicBool::new(false))),
        Duration::from_millis(10),
    );

    tokio::time::timeout(
        Duration::from_secs(5),
        worker.run_until(tokio::time::sleep(Duration::from_millis(50))),
    )
    .await
    .expect("worker should stop");
}

#[test]
fn store_reopens_with_queued_tasks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LocalStore::initialize(dir.path()).expect("store");
    let queued = task(5, "Fix bug", Priority::High, Status::Todo);
    store.put(&queued).expect("put");

    let reopened = LocalStore::initialize(dir.path()).expect("reopen");
    assert_eq!(reopened.list_all().expect("list"), vec![queued]);
}
