//! Local task list for `TaskClock`.
//!
//! [`TaskStore`] owns the authoritative in-memory list of tasks, validates
//! additions and removals, mirrors them to a [`RemoteSync`] backend, and
//! publishes a [`StoreEvent`] for every change. Activation flags are only
//! changed through [`crate::activation::ActivationCoordinator`].

pub mod events;

use std::sync::Arc;
use std::time::Duration;

use taskclock_proto::cloud::Predicate;
use taskclock_proto::record::{RecordId, RecordType};
use taskclock_proto::task::{MAX_TASK_NAME_CHARS, TaskRecord, counted_chars};
use tokio::sync::broadcast;

use crate::remote::{RemoteError, RemoteSync, bounded};

pub use events::StoreEvent;

/// Default maximum number of tasks a store holds.
pub const DEFAULT_MAX_TASKS: usize = 10;

/// Capacity of the change-notification channel.
const EVENT_BUFFER: usize = 64;

/// A store shared between callers and the activation coordinator.
///
/// The async mutex is the single owner of mutation: whoever holds the lock
/// is the only writer.
pub type SharedStore<R> = Arc<tokio::sync::Mutex<TaskStore<R>>>;

/// Errors returned by [`TaskStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Task name is empty.
    #[error("task name cannot be empty")]
    NameEmpty,
    /// Task name has too many counted characters.
    #[error("task name has {count} counted characters (max {max})")]
    NameTooLong {
        /// Counted characters in the rejected name.
        count: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Another task already uses this name.
    #[error("a task named {0:?} already exists")]
    DuplicateName(String),
    /// Another task already uses this id.
    #[error("a task with id {0} already exists")]
    DuplicateId(RecordId),
    /// The store is full.
    #[error("task list is full (max {max})")]
    CapacityExceeded {
        /// Configured maximum.
        max: usize,
    },
    /// The task is activated and cannot be removed.
    #[error("task {0} is activated")]
    TaskActivated(RecordId),
    /// No task with this id.
    #[error("task not found: {0}")]
    TaskNotFound(RecordId),
    /// Saving the new task remotely failed; the store is unchanged.
    #[error("failed to save task {id}: {source}")]
    RemoteWriteFailed {
        /// Task that was being saved.
        id: RecordId,
        /// Underlying remote failure.
        source: RemoteError,
    },
    /// Deleting the task remotely failed; the local removal stands.
    #[error("failed to delete task {id} remotely: {source}")]
    RemoteDeleteFailed {
        /// Task that was removed locally.
        id: RecordId,
        /// Underlying remote failure.
        source: RemoteError,
    },
    /// Loading the task list from the remote failed; the store is unchanged.
    #[error("failed to load tasks: {0}")]
    LoadFailed(RemoteError),
}

/// Limits and time bounds for a [`TaskStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of tasks.
    pub max_tasks: usize,
    /// Maximum counted characters in a task name.
    pub max_name_chars: usize,
    /// Bound on each remote call the store makes.
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            max_name_chars: MAX_TASK_NAME_CHARS,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Ordered, bounded list of tasks mirrored to a remote record store.
pub struct TaskStore<R> {
    /// Remote backend receiving creates and deletes.
    remote: Arc<R>,
    /// Tasks in insertion order.
    tasks: Vec<TaskRecord>,
    /// Limits.
    config: StoreConfig,
    /// Change notifications.
    events: broadcast::Sender<StoreEvent>,
}

impl<R: RemoteSync> TaskStore<R> {
    /// Creates an empty store backed by `remote`.
    #[must_use]
    pub fn new(remote: Arc<R>, config: StoreConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            remote,
            tasks: Vec::new(),
            config,
            events,
        }
    }

    /// Wraps this store for sharing with an activation coordinator.
    #[must_use]
    pub fn into_shared(self) -> SharedStore<R> {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Subscribes to change notifications.
    ///
    /// Only changes made after this call are delivered.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Returns the store limits.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns an ordered snapshot of all tasks.
    #[must_use]
    pub fn list(&self) -> Vec<TaskRecord> {
        self.tasks.clone()
    }

    /// Returns a task by id.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Returns the activated task, if any.
    ///
    /// If a prior inconsistency left several tasks activated, the first in
    /// list order is returned.
    #[must_use]
    pub fn active(&self) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.is_activated)
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if the store holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Adds a task and saves it remotely.
    ///
    /// The task is stored inactive regardless of its incoming flag. All
    /// local checks run before the remote call, and the task only enters the
    /// list once the save succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NameEmpty`], [`StoreError::NameTooLong`],
    /// [`StoreError::DuplicateName`], [`StoreError::DuplicateId`] or
    /// [`StoreError::CapacityExceeded`] without touching the remote, or
    /// [`StoreError::RemoteWriteFailed`] if the save fails.
    pub async fn add(&mut self, mut task: TaskRecord) -> Result<TaskRecord, StoreError> {
        task.is_activated = false;
        self.validate_new(&task)?;

        bounded(self.config.request_timeout, self.remote.save(task.to_record()))
            .await
            .map_err(|source| {
                tracing::warn!(task_id = %task.id, error = %source, "remote save of new task failed");
                StoreError::RemoteWriteFailed {
                    id: task.id.clone(),
                    source,
                }
            })?;

        self.tasks.push(task.clone());
        tracing::info!(task_id = %task.id, name = %task.name, "task added");
        self.publish(StoreEvent::Added(task.clone()));
        Ok(task)
    }

    /// Creates a fresh inactive task named `name` and adds it.
    ///
    /// # Errors
    ///
    /// Same as [`add`](Self::add).
    pub async fn create(&mut self, name: &str) -> Result<TaskRecord, StoreError> {
        self.add(TaskRecord::new(name)).await
    }

    /// Removes a task locally and deletes it remotely.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskActivated`] or [`StoreError::TaskNotFound`]
    /// without any change or remote call. Returns
    /// [`StoreError::RemoteDeleteFailed`] if the remote delete fails; the
    /// task has already left the local list in that case and the delete is
    /// not retried.
    pub async fn remove(&mut self, id: &RecordId) -> Result<TaskRecord, StoreError> {
        let index = self
            .tasks
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| StoreError::TaskNotFound(id.clone()))?;
        if self.tasks[index].is_activated {
            return Err(StoreError::TaskActivated(id.clone()));
        }

        let removed = self.tasks.remove(index);
        tracing::info!(task_id = %id, "task removed");
        self.publish(StoreEvent::Removed(id.clone()));

        bounded(self.config.request_timeout, self.remote.delete(id))
            .await
            .map_err(|source| {
                tracing::warn!(task_id = %id, error = %source, "remote delete failed");
                StoreError::RemoteDeleteFailed {
                    id: id.clone(),
                    source,
                }
            })?;

        Ok(removed)
    }

    /// Replaces the local list with the tasks stored remotely.
    ///
    /// Records that do not parse as tasks are skipped. If the remote holds
    /// more tasks than the store allows, the oldest `max_tasks` are kept.
    /// Returns the number of tasks loaded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LoadFailed`] if the query fails; the local list
    /// is left untouched.
    pub async fn load(&mut self) -> Result<usize, StoreError> {
        let records = bounded(
            self.config.request_timeout,
            self.remote.query(RecordType::Task, Predicate::All),
        )
        .await
        .map_err(StoreError::LoadFailed)?;

        let mut tasks: Vec<TaskRecord> = records
            .iter()
            .filter_map(|record| match TaskRecord::from_record(record) {
                Ok(task) => Some(task),
                Err(e) => {
                    tracing::warn!(record_id = %record.id, error = %e, "skipping malformed task record");
                    None
                }
            })
            .collect();

        if tasks.len() > self.config.max_tasks {
            tracing::warn!(
                found = tasks.len(),
                max = self.config.max_tasks,
                "remote holds more tasks than allowed, truncating"
            );
            tasks.truncate(self.config.max_tasks);
        }

        let active = tasks.iter().filter(|t| t.is_activated).count();
        if active > 1 {
            tracing::warn!(active, "loaded task list has several activated tasks");
        }

        let count = tasks.len();
        self.tasks = tasks;
        tracing::info!(count, remote = %self.remote.kind(), "task list loaded");
        self.publish(StoreEvent::Reloaded { count });
        Ok(count)
    }

    /// Sets the activation flag of a task after a confirmed remote write.
    ///
    /// Returns `false` if the task is no longer in the store.
    pub(crate) fn apply_activation(&mut self, id: &RecordId, is_activated: bool) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| &t.id == id) else {
            return false;
        };
        task.is_activated = is_activated;
        self.publish(StoreEvent::ActivationChanged {
            id: id.clone(),
            is_activated,
        });
        true
    }

    fn validate_new(&self, task: &TaskRecord) -> Result<(), StoreError> {
        if task.name.is_empty() {
            return Err(StoreError::NameEmpty);
        }
        let count = counted_chars(&task.name);
        if count > self.config.max_name_chars {
            return Err(StoreError::NameTooLong {
                count,
                max: self.config.max_name_chars,
            });
        }
        if self.tasks.iter().any(|t| t.name == task.name) {
            return Err(StoreError::DuplicateName(task.name.clone()));
        }
        if self.get(&task.id).is_some() {
            return Err(StoreError::DuplicateId(task.id.clone()));
        }
        if self.tasks.len() >= self.config.max_tasks {
            return Err(StoreError::CapacityExceeded {
                max: self.config.max_tasks,
            });
        }
        Ok(())
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
