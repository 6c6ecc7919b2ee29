//! Cloud record service wire protocol.
//!
//! Defines the [`CloudFrame`] enum that is postcard-encoded and sent over
//! WebSocket binary frames between `TaskClock` clients and the record
//! service. Every request carries a client-chosen id that the matching
//! response echoes, so a client may keep many requests in flight on one
//! connection.

use serde::{Deserialize, Serialize};

use crate::record::{FieldValue, Record, RecordId, RecordType};

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Filter applied by [`CloudRequest::Query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every record of the queried type.
    All,
    /// Matches records whose field equals the given value.
    FieldEquals {
        /// Field name to compare.
        field: String,
        /// Value the field must hold.
        value: FieldValue,
    },
}

impl Predicate {
    /// Returns `true` if `record` satisfies this predicate.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::FieldEquals { field, value } => record.get(field) == Some(value),
        }
    }
}

/// Operations a client can ask of the record service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudRequest {
    /// Look up one record by id.
    Fetch {
        /// Record key.
        id: RecordId,
    },
    /// Insert or replace a record.
    Save {
        /// Full record to store.
        record: Record,
    },
    /// Remove a record by id.
    Delete {
        /// Record key.
        id: RecordId,
    },
    /// List records of a type that match a predicate.
    Query {
        /// Type to list.
        record_type: RecordType,
        /// Filter to apply.
        predicate: Predicate,
    },
}

/// Outcomes returned by the record service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudResponse {
    /// A single record (answer to `Fetch` and `Save`).
    Record(Record),
    /// The requested id does not exist in the user's zone.
    NotFound {
        /// Key that was looked up.
        id: RecordId,
    },
    /// The record was removed.
    Deleted {
        /// Key that was removed.
        id: RecordId,
    },
    /// Query results in first-save order.
    Records(Vec<Record>),
    /// The service refused or failed the request.
    Error {
        /// Human-readable reason.
        reason: String,
    },
}

/// Top-level frame exchanged on the WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudFrame {
    /// Client opens its user zone. Must be the first frame on a connection.
    Register {
        /// User whose private zone this connection operates on.
        user_id: String,
    },
    /// Server acknowledges registration.
    Registered {
        /// Echo of the registered user id.
        user_id: String,
    },
    /// A client request.
    Request {
        /// Client-chosen correlation id.
        request_id: u64,
        /// The operation.
        request: CloudRequest,
    },
    /// The server's answer to a request.
    Response {
        /// Correlation id copied from the request.
        request_id: u64,
        /// The outcome.
        response: CloudResponse,
    },
    /// Connection-level error not tied to a request.
    Error {
        /// Human-readable reason.
        reason: String,
    },
}

/// Encodes a [`CloudFrame`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the frame cannot be serialized.
pub fn encode(frame: &CloudFrame) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`CloudFrame`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes are not a valid frame.
pub fn decode(bytes: &[u8]) -> Result<CloudFrame, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
