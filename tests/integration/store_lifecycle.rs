// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for the task list lifecycle.
//!
//! Covers create/remove/load against a `MemoryRemote`, the validation rules
//! (capacity, duplicate names, counted-character limit), and how a store
//! combined with the activation coordinator behaves across a reload.

use std::sync::Arc;
use std::time::Duration;

use taskclock::activation::ActivationCoordinator;
use taskclock::remote::memory::{Fault, MemoryRemote, RemoteOp};
use taskclock::remote::{RemoteError, RemoteSync};
use taskclock::store::{StoreConfig, StoreError, StoreEvent, TaskStore};
use taskclock_proto::cloud::Predicate;
use taskclock_proto::record::{RecordId, RecordType};
use taskclock_proto::task::TaskRecord;

fn new_store() -> (Arc<MemoryRemote>, TaskStore<MemoryRemote>) {
    let remote = Arc::new(MemoryRemote::new());
    let store = TaskStore::new(Arc::clone(&remote), StoreConfig::default());
    (remote, store)
}

// =============================================================================
// Create / capacity / validation
// =============================================================================

#[tokio::test]
async fn eleventh_task_is_rejected() {
    let (remote, mut store) = new_store();
    for i in 0..10 {
        store.create(&format!("task {i}")).await.unwrap();
    }

    let err = store.create("one too many").await.unwrap_err();

    assert_eq!(err, StoreError::CapacityExceeded { max: 10 });
    assert_eq!(store.len(), 10);
    assert_eq!(remote.len(), 10);
}

#[tokio::test]
async fn counted_characters_limit_only_cjk() {
    let (_remote, mut store) = new_store();

    // 20 ideographs plus any amount of Latin text is fine.
    let twenty = "一".repeat(20);
    store
        .create(&format!("{twenty} with a long latin suffix"))
        .await
        .unwrap();

    let err = store.create(&"二".repeat(21)).await.unwrap_err();
    assert_eq!(err, StoreError::NameTooLong { count: 21, max: 20 });
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn validation_happens_before_any_remote_call() {
    let (remote, mut store) = new_store();
    store.create("Read").await.unwrap();
    remote.clear_operations();

    assert_eq!(
        store.create("Read").await.unwrap_err(),
        StoreError::DuplicateName("Read".to_string())
    );
    assert_eq!(store.create("").await.unwrap_err(), StoreError::NameEmpty);
    assert!(remote.operations().is_empty());
}

#[tokio::test]
async fn rejected_save_leaves_store_unchanged() {
    let (remote, mut store) = new_store();
    let task = TaskRecord::new("Write");
    remote.inject(&task.id, Fault::Save);

    let err = store.add(task.clone()).await.unwrap_err();

    assert!(matches!(err, StoreError::RemoteWriteFailed { ref id, .. } if *id == task.id));
    assert!(store.is_empty());
    assert!(remote.is_empty());
}

// =============================================================================
// Remove
// =============================================================================

#[tokio::test]
async fn active_task_cannot_be_removed() {
    let (remote, mut store) = new_store();
    let task = store.create("Focus").await.unwrap();
    let shared = store.into_shared();
    let coordinator =
        ActivationCoordinator::new(Arc::clone(&shared), Arc::clone(&remote), Duration::from_secs(5));
    coordinator.activate(&task.id).await.unwrap();
    remote.clear_operations();

    let err = shared.lock().await.remove(&task.id).await.unwrap_err();

    assert_eq!(err, StoreError::TaskActivated(task.id.clone()));
    assert_eq!(shared.lock().await.len(), 1);
    assert!(remote.operations().is_empty());
}

#[tokio::test]
async fn remove_after_deactivate_deletes_remotely() {
    let (remote, mut store) = new_store();
    let task = store.create("Focus").await.unwrap();
    let shared = store.into_shared();
    let coordinator =
        ActivationCoordinator::new(Arc::clone(&shared), Arc::clone(&remote), Duration::from_secs(5));
    coordinator.activate(&task.id).await.unwrap();
    coordinator.deactivate(&task.id).await.unwrap();

    let removed = shared.lock().await.remove(&task.id).await.unwrap();

    assert_eq!(removed.id, task.id);
    assert!(shared.lock().await.is_empty());
    assert!(remote.peek(&task.id).is_none());
    assert!(remote.operations().contains(&RemoteOp::Delete(task.id)));
}

#[tokio::test]
async fn failed_remote_delete_keeps_local_removal() {
    let (remote, mut store) = new_store();
    let task = store.create("Stale").await.unwrap();
    remote.inject(&task.id, Fault::Delete);

    let err = store.remove(&task.id).await.unwrap_err();

    assert!(matches!(
        err,
        StoreError::RemoteDeleteFailed { ref id, source: RemoteError::Rejected(_) } if *id == task.id
    ));
    assert!(store.get(&task.id).is_none());
    assert!(remote.peek(&task.id).is_some());
}

// =============================================================================
// Load
// =============================================================================

#[tokio::test]
async fn load_reads_what_another_store_wrote() {
    let (remote, mut writer) = new_store();
    writer.create("Read").await.unwrap();
    writer.create("读书").await.unwrap();

    let mut reader = TaskStore::new(Arc::clone(&remote), StoreConfig::default());
    let mut events = reader.subscribe();
    let count = reader.load().await.unwrap();

    assert_eq!(count, 2);
    let names: Vec<String> = reader.list().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["Read".to_string(), "读书".to_string()]);
    assert_eq!(events.try_recv().unwrap(), StoreEvent::Reloaded { count: 2 });
}

#[tokio::test]
async fn load_truncates_to_capacity() {
    let remote = Arc::new(MemoryRemote::with_records(
        (0..15).map(|i| TaskRecord::new(format!("t{i}")).to_record()),
    ));
    let mut store = TaskStore::new(Arc::clone(&remote), StoreConfig::default());

    assert_eq!(store.load().await.unwrap(), 10);
    assert_eq!(store.list()[0].name, "t0");
    assert_eq!(store.list()[9].name, "t9");
}

#[tokio::test]
async fn activation_survives_reload() {
    let (remote, mut store) = new_store();
    store.create("a").await.unwrap();
    let b = store.create("b").await.unwrap();
    let coordinator = ActivationCoordinator::new(
        store.into_shared(),
        Arc::clone(&remote),
        Duration::from_secs(5),
    );
    coordinator.activate(&b.id).await.unwrap();

    let mut fresh = TaskStore::new(Arc::clone(&remote), StoreConfig::default());
    fresh.load().await.unwrap();

    assert_eq!(fresh.active().map(|t| t.id.clone()), Some(b.id));
    let active = remote
        .query(
            RecordType::Task,
            Predicate::FieldEquals {
                field: "isActivated".to_string(),
                value: taskclock_proto::task::activation_value(true),
            },
        )
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let (_remote, mut store) = new_store();
    let ghost = RecordId::new("ghost");
    assert_eq!(
        store.remove(&ghost).await.unwrap_err(),
        StoreError::TaskNotFound(ghost)
    );
}
