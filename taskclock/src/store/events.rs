//! Change notifications published by [`super::TaskStore`].

use taskclock_proto::record::RecordId;
use taskclock_proto::task::TaskRecord;

/// A change to the task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A task was added (after its remote save succeeded).
    Added(TaskRecord),
    /// A task left the local list.
    Removed(RecordId),
    /// A task's activation flag was set after a confirmed remote write.
    ActivationChanged {
        /// Task whose flag changed.
        id: RecordId,
        /// New value.
        is_activated: bool,
    },
    /// The whole list was replaced from the remote.
    Reloaded {
        /// Number of tasks now in the store.
        count: usize,
    },
}
