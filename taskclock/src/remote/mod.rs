//! Remote record store abstraction for `TaskClock`.
//!
//! Defines the [`RemoteSync`] trait that every record backend satisfies.
//! Concrete implementations:
//! - [`memory::MemoryRemote`]: in-process store with fault injection for tests
//! - [`cloud::CloudRemote`]: WebSocket client for the `taskclock-cloud` service

pub mod cloud;
pub mod memory;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use taskclock_proto::cloud::Predicate;
use taskclock_proto::record::{Record, RecordId, RecordType};

/// Describes which kind of backend is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    /// In-process memory store.
    Memory,
    /// Cloud record service over WebSocket.
    Cloud,
}

impl fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

/// Errors that can occur during remote record operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// No record with this id exists remotely.
    #[error("record {0} not found")]
    NotFound(RecordId),

    /// The operation did not finish within its time bound.
    #[error("remote operation timed out")]
    Timeout,

    /// The connection to the record service is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// The record service refused or failed the request.
    #[error("rejected by record service: {0}")]
    Rejected(String),

    /// The service answered with something that makes no sense for the request.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Async access to a per-user remote record store.
///
/// Every call is independent: there is no ordering between concurrent calls
/// and no atomicity across records. Callers that need several writes to
/// land together must join them and handle each outcome separately.
pub trait RemoteSync: Send + Sync {
    /// Fetch a record by id.
    ///
    /// Returns [`RemoteError::NotFound`] when the id is absent.
    fn fetch(&self, id: &RecordId) -> impl Future<Output = Result<Record, RemoteError>> + Send;

    /// Insert or replace a record, returning the stored copy.
    fn save(&self, record: Record) -> impl Future<Output = Result<Record, RemoteError>> + Send;

    /// Delete a record by id.
    fn delete(&self, id: &RecordId) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// List records of `record_type` matching `predicate`, oldest first.
    fn query(
        &self,
        record_type: RecordType,
        predicate: Predicate,
    ) -> impl Future<Output = Result<Vec<Record>, RemoteError>> + Send;

    /// Return the kind of this backend.
    fn kind(&self) -> RemoteKind;
}

/// Runs a remote operation under a time bound.
///
/// An elapsed bound yields [`RemoteError::Timeout`]; the inner future is
/// dropped.
///
/// # Errors
///
/// Returns the inner error, or [`RemoteError::Timeout`] if `limit` elapses.
pub async fn bounded<T>(
    limit: Duration,
    operation: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, RemoteError> {
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| RemoteError::Timeout)?
}
