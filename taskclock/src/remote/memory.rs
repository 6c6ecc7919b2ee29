//! In-memory record store for tests and offline runs.
//!
//! [`MemoryRemote`] keeps records in insertion order behind a mutex and lets
//! callers inject per-record faults, add artificial latency, and inspect the
//! log of operations that reached it.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use taskclock_proto::cloud::Predicate;
use taskclock_proto::record::{Record, RecordId, RecordType};

use super::{RemoteError, RemoteKind, RemoteSync};

/// A failure that can be injected for a specific record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `fetch` for this id is rejected.
    Fetch,
    /// `save` for this id is rejected.
    Save,
    /// `delete` for this id is rejected.
    Delete,
    /// Every operation on this id never completes.
    Hang,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Save => write!(f, "save"),
            Self::Delete => write!(f, "delete"),
            Self::Hang => write!(f, "hang"),
        }
    }
}

/// An operation observed by a [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    /// `fetch(id)` was called.
    Fetch(RecordId),
    /// `save(record)` was called for this id.
    Save(RecordId),
    /// `delete(id)` was called.
    Delete(RecordId),
    /// `query(record_type, _)` was called.
    Query(RecordType),
}

/// In-process [`RemoteSync`] backend.
#[derive(Default)]
pub struct MemoryRemote {
    /// Records in first-save order.
    records: Mutex<Vec<Record>>,
    /// Injected `(id, fault)` pairs.
    faults: Mutex<HashSet<(RecordId, Fault)>>,
    /// Every call in arrival order.
    log: Mutex<Vec<RemoteOp>>,
    /// Delay applied before each operation.
    latency: Option<Duration>,
}

impl MemoryRemote {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `records` (in order).
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Delays every operation by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes `fault` apply to every later operation on `id`.
    pub fn inject(&self, id: &RecordId, fault: Fault) {
        self.faults.lock().insert((id.clone(), fault));
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Returns a copy of the operation log.
    #[must_use]
    pub fn operations(&self) -> Vec<RemoteOp> {
        self.log.lock().clone()
    }

    /// Clears the operation log.
    pub fn clear_operations(&self) {
        self.log.lock().clear();
    }

    /// Number of `save` calls that targeted `id`.
    #[must_use]
    pub fn save_count(&self, id: &RecordId) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|op| matches!(op, RemoteOp::Save(saved) if saved == id))
            .count()
    }

    /// Returns the stored copy of a record without logging an operation.
    #[must_use]
    pub fn peek(&self, id: &RecordId) -> Option<Record> {
        self.records.lock().iter().find(|r| &r.id == id).cloned()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Records `op`, waits out the latency, then applies any injected fault.
    async fn enter(&self, op: RemoteOp, id: Option<&RecordId>, fault: Fault) -> Result<(), RemoteError> {
        self.log.lock().push(op);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let Some(id) = id else {
            return Ok(());
        };
        let (fails, hangs) = {
            let faults = self.faults.lock();
            (
                faults.contains(&(id.clone(), fault)),
                faults.contains(&(id.clone(), Fault::Hang)),
            )
        };
        if hangs {
            std::future::pending::<()>().await;
        }
        if fails {
            return Err(RemoteError::Rejected(format!("injected {fault} failure for {id}")));
        }
        Ok(())
    }
}

impl RemoteSync for MemoryRemote {
    async fn fetch(&self, id: &RecordId) -> Result<Record, RemoteError> {
        self.enter(RemoteOp::Fetch(id.clone()), Some(id), Fault::Fetch)
            .await?;
        self.peek(id).ok_or_else(|| RemoteError::NotFound(id.clone()))
    }

    async fn save(&self, record: Record) -> Result<Record, RemoteError> {
        self.enter(RemoteOp::Save(record.id.clone()), Some(&record.id), Fault::Save)
            .await?;
        let mut records = self.records.lock();
        if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
            *existing = record.clone();
        } else {
            records.push(record.clone());
        }
        drop(records);
        Ok(record)
    }

    async fn delete(&self, id: &RecordId) -> Result<(), RemoteError> {
        self.enter(RemoteOp::Delete(id.clone()), Some(id), Fault::Delete)
            .await?;
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| &r.id != id);
        let removed = records.len() != before;
        drop(records);
        if removed {
            Ok(())
        } else {
            Err(RemoteError::NotFound(id.clone()))
        }
    }

    async fn query(
        &self,
        record_type: RecordType,
        predicate: Predicate,
    ) -> Result<Vec<Record>, RemoteError> {
        self.enter(RemoteOp::Query(record_type), None, Fault::Fetch)
            .await?;
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|r| r.record_type == record_type && predicate.matches(r))
            .cloned()
            .collect())
    }

    fn kind(&self) -> RemoteKind {
        RemoteKind::Memory
    }
}
