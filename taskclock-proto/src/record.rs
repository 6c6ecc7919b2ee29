//! Generic cloud record model.
//!
//! A [`Record`] is a flat map of field name to scalar [`FieldValue`], keyed
//! by a [`RecordId`] and tagged with a [`RecordType`]. Typed views such as
//! [`crate::task::TaskRecord`] convert to and from this shape.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique identifier of a record.
///
/// Freshly generated ids are UUID v7 strings, but any non-empty string
/// received from the record service is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Generates a new time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which kind of record a [`Record`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A task entry.
    Task,
    /// A schedule entry.
    Schedule,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => write!(f, "Task"),
            Self::Schedule => write!(f, "Schedule"),
        }
    }
}

/// A scalar field value stored in a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Signed integer (also used for 0/1 flags).
    Int(i64),
    /// UTF-8 text.
    Text(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
}

impl FieldValue {
    /// Returns the integer payload, if this is an [`FieldValue::Int`].
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text payload, if this is a [`FieldValue::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the timestamp payload, if this is a [`FieldValue::Timestamp`].
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<i64> {
        match self {
            Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

/// Errors converting a generic [`Record`] into a typed view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The record carries a different type tag.
    #[error("expected {expected} record, found {found}")]
    WrongType {
        /// Type the caller asked for.
        expected: RecordType,
        /// Type found on the record.
        found: RecordType,
    },
    /// A required field is absent.
    #[error("record is missing field `{0}`")]
    MissingField(&'static str),
    /// A field holds a value of the wrong shape.
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField {
        /// Offending field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// A flat record as persisted by the cloud record service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record key.
    pub id: RecordId,
    /// Record type tag.
    pub record_type: RecordType,
    /// Field name -> value.
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Creates an empty record of the given type.
    #[must_use]
    pub const fn new(id: RecordId, record_type: RecordType) -> Self {
        Self {
            id,
            record_type,
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field, returning the previous value if there was one.
    pub fn set(&mut self, field: &str, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(field.to_string(), value)
    }

    /// Returns the value of a field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Builder-style variant of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, field: &str, value: FieldValue) -> Self {
        self.set(field, value);
        self
    }
}
