//! Single-activation coordination.
//!
//! [`ActivationCoordinator`] keeps at most one task activated. Activating a
//! task fans out one remote write per affected task (the target plus every
//! other task that is currently activated), waits for all of them, and only
//! then applies the confirmed values to the [`TaskStore`]. Each write is
//! independent: a failure for one task neither aborts nor rolls back the
//! others, and shows up as a per-task entry in the [`ActivationReport`].
//!
//! Calls are serialized by holding the store lock for the whole operation,
//! so two activations can never both observe "nothing is active".

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use taskclock_proto::record::RecordId;
use taskclock_proto::task::{FIELD_IS_ACTIVATED, TaskRecord, activation_value};

use crate::remote::{RemoteError, RemoteSync, bounded};
use crate::store::{SharedStore, TaskStore};

/// Why a single task's remote write failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum SyncFailure {
    /// The task has no remote record.
    #[error("remote record not found")]
    RecordNotFound,
    /// Fetching or saving the record failed.
    #[error("remote write failed: {0}")]
    RemoteWriteFailed(String),
    /// A remote call did not finish in time.
    #[error("remote call timed out")]
    Timeout,
}

impl From<RemoteError> for SyncFailure {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(_) => Self::RecordNotFound,
            RemoteError::Timeout => Self::Timeout,
            other => Self::RemoteWriteFailed(other.to_string()),
        }
    }
}

/// Errors that stop an activation before any remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationError {
    /// The target task is not in the store.
    #[error("task not found: {0}")]
    TaskNotFound(RecordId),
}

/// Per-task outcome of one [`ActivationCoordinator::set_activation`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Task the caller targeted.
    pub target: RecordId,
    /// Value requested for the target.
    pub desired: bool,
    /// Tasks whose new value was saved remotely and applied locally.
    pub updated: BTreeMap<RecordId, bool>,
    /// Tasks whose write failed; their local state is unchanged.
    pub failed: BTreeMap<RecordId, SyncFailure>,
}

impl ActivationReport {
    fn new(target: RecordId, desired: bool) -> Self {
        Self {
            target,
            desired,
            updated: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }

    /// Every scheduled write succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Some writes succeeded and some failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.updated.is_empty() && !self.failed.is_empty()
    }

    /// The target task itself now holds the requested value.
    #[must_use]
    pub fn target_applied(&self) -> bool {
        self.updated.get(&self.target) == Some(&self.desired)
    }

    /// Failure recorded for `id`, if any.
    #[must_use]
    pub fn failure(&self, id: &RecordId) -> Option<&SyncFailure> {
        self.failed.get(id)
    }
}

/// Works out which tasks need a write and to which value.
///
/// The target always gets a write, so a repeated call re-asserts the remote
/// state. When activating, every other activated task is deactivated. Each
/// id appears at most once.
#[must_use]
pub fn plan_writes(tasks: &[TaskRecord], target: &RecordId, desired: bool) -> Vec<(RecordId, bool)> {
    let mut plan = Vec::new();
    if desired {
        plan.extend(
            tasks
                .iter()
                .filter(|t| t.is_activated && &t.id != target)
                .map(|t| (t.id.clone(), false)),
        );
    }
    plan.push((target.clone(), desired));
    plan
}

/// Enforces "at most one activated task" across a [`TaskStore`] and its remote.
pub struct ActivationCoordinator<R> {
    /// Store whose flags are reconciled.
    store: SharedStore<R>,
    /// Remote backend receiving the writes.
    remote: Arc<R>,
    /// Bound on each individual remote call.
    request_timeout: Duration,
}

impl<R: RemoteSync> ActivationCoordinator<R> {
    /// Creates a coordinator over `store`, writing through `remote`.
    ///
    /// Each fetch and save is bounded by `request_timeout`.
    #[must_use]
    pub const fn new(store: SharedStore<R>, remote: Arc<R>, request_timeout: Duration) -> Self {
        Self {
            store,
            remote,
            request_timeout,
        }
    }

    /// Returns the shared store this coordinator reconciles.
    #[must_use]
    pub fn store(&self) -> SharedStore<R> {
        Arc::clone(&self.store)
    }

    /// Activates `task_id`, deactivating every other task.
    ///
    /// # Errors
    ///
    /// See [`set_activation`](Self::set_activation).
    pub async fn activate(&self, task_id: &RecordId) -> Result<ActivationReport, ActivationError> {
        self.set_activation(task_id, true).await
    }

    /// Deactivates `task_id`.
    ///
    /// # Errors
    ///
    /// See [`set_activation`](Self::set_activation).
    pub async fn deactivate(
        &self,
        task_id: &RecordId,
    ) -> Result<ActivationReport, ActivationError> {
        self.set_activation(task_id, false).await
    }

    /// Sets the activation flag of `task_id` to `desired`.
    ///
    /// Returns only after every scheduled remote write has settled. Remote
    /// failures never surface as `Err`; they are listed in the report.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::TaskNotFound`] if the task is not in the
    /// store. No remote call is made in that case.
    pub async fn set_activation(
        &self,
        task_id: &RecordId,
        desired: bool,
    ) -> Result<ActivationReport, ActivationError> {
        let mut store = self.store.lock().await;
        if store.get(task_id).is_none() {
            return Err(ActivationError::TaskNotFound(task_id.clone()));
        }

        let plan = plan_writes(&store.list(), task_id, desired);
        tracing::info!(
            task_id = %task_id,
            desired,
            writes = plan.len(),
            "setting task activation"
        );

        let outcomes = join_all(
            plan.iter()
                .map(|(id, value)| self.write_activation(id, *value)),
        )
        .await;

        let report = reconcile(&mut store, task_id, desired, plan, outcomes);
        drop(store);

        if report.is_complete() {
            tracing::info!(task_id = %task_id, desired, "activation settled");
        } else {
            tracing::warn!(
                task_id = %task_id,
                desired,
                failed = report.failed.len(),
                updated = report.updated.len(),
                "activation settled with failures"
            );
        }
        Ok(report)
    }

    /// Fetches the task's record, sets its flag, and saves it.
    async fn write_activation(&self, id: &RecordId, value: bool) -> Result<(), SyncFailure> {
        let mut record = bounded(self.request_timeout, self.remote.fetch(id)).await?;
        record.set(FIELD_IS_ACTIVATED, activation_value(value));
        bounded(self.request_timeout, self.remote.save(record)).await?;
        tracing::debug!(task_id = %id, value, "activation write saved");
        Ok(())
    }
}

/// Applies confirmed writes to the store and builds the report.
fn reconcile<R: RemoteSync>(
    store: &mut TaskStore<R>,
    target: &RecordId,
    desired: bool,
    plan: Vec<(RecordId, bool)>,
    outcomes: Vec<Result<(), SyncFailure>>,
) -> ActivationReport {
    let mut report = ActivationReport::new(target.clone(), desired);
    for ((id, value), outcome) in plan.into_iter().zip(outcomes) {
        match outcome {
            Ok(()) => {
                if !store.apply_activation(&id, value) {
                    tracing::debug!(task_id = %id, "task left the store before its write settled");
                }
                report.updated.insert(id, value);
            }
            Err(failure) => {
                tracing::warn!(task_id = %id, value, error = %failure, "activation write failed");
                report.failed.insert(id, failure);
            }
        }
    }
    report
}
