// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! End-to-end tests against an in-process `taskclock-cloud` service.
//!
//! Each test starts the record service on an OS-assigned port, connects one
//! or more `CloudRemote` clients, and drives the task store and activation
//! coordinator through the real WebSocket protocol.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use taskclock::activation::{ActivationCoordinator, SyncFailure};
use taskclock::remote::cloud::{CloudRemote, CloudSettings};
use taskclock::remote::{RemoteError, RemoteKind, RemoteSync};
use taskclock::store::{StoreConfig, StoreError, TaskStore};
use taskclock_cloud::server::{self, CloudState};
use taskclock_cloud::store::RecordStore;
use taskclock_proto::cloud::Predicate;
use taskclock_proto::record::{RecordId, RecordType};
use taskclock_proto::task::TaskRecord;

async fn start_service(state: CloudState) -> (SocketAddr, Arc<CloudState>) {
    let state = Arc::new(state);
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start record service");
    (addr, state)
}

fn settings(addr: SocketAddr, user_id: &str) -> CloudSettings {
    CloudSettings {
        url: format!("ws://{addr}/ws"),
        user_id: user_id.to_string(),
        connect_timeout: Duration::from_secs(5),
        register_timeout: Duration::from_secs(5),
    }
}

async fn connect(addr: SocketAddr, user_id: &str) -> Arc<CloudRemote> {
    Arc::new(CloudRemote::connect(&settings(addr, user_id)).await.unwrap())
}

// =============================================================================
// Connection
// =============================================================================

#[tokio::test]
async fn connect_registers_user() {
    let (addr, state) = start_service(CloudState::new()).await;
    let remote = connect(addr, "alice").await;

    assert_eq!(remote.user_id(), "alice");
    assert_eq!(remote.kind(), RemoteKind::Cloud);
    assert!(remote.is_connected());
    assert_eq!(state.session_count("alice").await, 1);
}

#[tokio::test]
async fn connect_to_nothing_fails() {
    // Bind then drop a listener to get a port nobody is serving.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = CloudRemote::connect(&settings(addr, "alice")).await;
    assert!(matches!(result, Err(RemoteError::ConnectionClosed)));
}

#[tokio::test]
async fn closed_connection_fails_calls() {
    let (addr, state) = start_service(CloudState::new()).await;
    let remote = connect(addr, "alice").await;

    state.close_all_connections().await;
    // Wait for the reader task to notice.
    for _ in 0..50 {
        if !remote.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(!remote.is_connected());
    let err = remote.fetch(&RecordId::new("a")).await.unwrap_err();
    assert_eq!(err, RemoteError::ConnectionClosed);
}

// =============================================================================
// Record operations
// =============================================================================

#[tokio::test]
async fn record_operations_round_trip() {
    let (addr, _state) = start_service(CloudState::new()).await;
    let remote = connect(addr, "alice").await;
    let task = TaskRecord::new("Read");

    let saved = remote.save(task.to_record()).await.unwrap();
    assert_eq!(saved, task.to_record());
    assert_eq!(remote.fetch(&task.id).await.unwrap(), task.to_record());

    let listed = remote.query(RecordType::Task, Predicate::All).await.unwrap();
    assert_eq!(listed.len(), 1);

    remote.delete(&task.id).await.unwrap();
    assert_eq!(
        remote.fetch(&task.id).await.unwrap_err(),
        RemoteError::NotFound(task.id.clone())
    );
    assert!(matches!(
        remote.delete(&task.id).await,
        Err(RemoteError::NotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_requests_get_their_own_responses() {
    let (addr, _state) = start_service(CloudState::new()).await;
    let remote = connect(addr, "alice").await;

    let tasks: Vec<TaskRecord> = (0..8).map(|i| TaskRecord::new(format!("t{i}"))).collect();
    let saves = tasks.iter().map(|t| remote.save(t.to_record()));
    for result in futures_util::future::join_all(saves).await {
        result.unwrap();
    }

    let fetches = tasks.iter().map(|t| remote.fetch(&t.id));
    let fetched = futures_util::future::join_all(fetches).await;
    for (task, record) in tasks.iter().zip(fetched) {
        assert_eq!(record.unwrap().id, task.id);
    }
}

#[tokio::test]
async fn users_have_separate_zones() {
    let (addr, _state) = start_service(CloudState::new()).await;
    let alice = connect(addr, "alice").await;
    let bob = connect(addr, "bob").await;

    let task = TaskRecord::new("private");
    alice.save(task.to_record()).await.unwrap();

    assert!(matches!(
        bob.fetch(&task.id).await,
        Err(RemoteError::NotFound(_))
    ));
    assert!(
        bob.query(RecordType::Task, Predicate::All)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn full_zone_rejects_new_tasks() {
    let state = CloudState::with_config(64 * 1024, RecordStore::with_max_records(1));
    let (addr, _state) = start_service(state).await;
    let remote = connect(addr, "alice").await;

    let mut store = TaskStore::new(Arc::clone(&remote), StoreConfig::default());
    store.create("first").await.unwrap();
    let err = store.create("second").await.unwrap_err();

    assert!(matches!(
        err,
        StoreError::RemoteWriteFailed {
            source: RemoteError::Rejected(_),
            ..
        }
    ));
    assert_eq!(store.len(), 1);
}

// =============================================================================
// Store + coordinator over the wire
// =============================================================================

#[tokio::test]
async fn activation_scenario_over_the_wire() {
    let (addr, _state) = start_service(CloudState::new()).await;
    let remote = connect(addr, "alice").await;

    let mut store = TaskStore::new(Arc::clone(&remote), StoreConfig::default());
    let a = store.create("A").await.unwrap();
    let b = store.create("B").await.unwrap();
    let c = store.create("C").await.unwrap();

    let coordinator = ActivationCoordinator::new(
        store.into_shared(),
        Arc::clone(&remote),
        Duration::from_secs(5),
    );
    coordinator.activate(&a.id).await.unwrap();
    let report = coordinator.activate(&b.id).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.updated.get(&a.id), Some(&false));
    assert_eq!(report.updated.get(&b.id), Some(&true));
    assert!(!report.updated.contains_key(&c.id));

    // A second client sees the same state.
    let other = connect(addr, "alice").await;
    let mut fresh = TaskStore::new(other, StoreConfig::default());
    fresh.load().await.unwrap();
    let flags: Vec<(String, bool)> = fresh
        .list()
        .into_iter()
        .map(|t| (t.name, t.is_activated))
        .collect();
    assert_eq!(
        flags,
        vec![
            ("A".to_string(), false),
            ("B".to_string(), true),
            ("C".to_string(), false)
        ]
    );
}

#[tokio::test]
async fn record_deleted_elsewhere_is_reported() {
    let (addr, _state) = start_service(CloudState::new()).await;
    let remote = connect(addr, "alice").await;

    let mut store = TaskStore::new(Arc::clone(&remote), StoreConfig::default());
    let task = store.create("Vanishing").await.unwrap();

    let other = connect(addr, "alice").await;
    other.delete(&task.id).await.unwrap();

    let coordinator = ActivationCoordinator::new(
        store.into_shared(),
        Arc::clone(&remote),
        Duration::from_secs(5),
    );
    let report = coordinator.activate(&task.id).await.unwrap();

    assert_eq!(report.failure(&task.id), Some(&SyncFailure::RecordNotFound));
    assert!(coordinator.store().lock().await.active().is_none());
}
