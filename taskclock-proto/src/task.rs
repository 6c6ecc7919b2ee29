//! Task record type for `TaskClock`.
//!
//! Defines the typed [`TaskRecord`] view over a generic [`Record`], the
//! wire field names, and the counted-character rule for task names.

use serde::{Deserialize, Serialize};

use crate::record::{FieldValue, Record, RecordError, RecordId, RecordType};

/// Default maximum number of counted characters in a task name.
pub const MAX_TASK_NAME_CHARS: usize = 20;

/// Record field holding the task id.
pub const FIELD_ID: &str = "id";
/// Record field holding the task name.
pub const FIELD_NAME: &str = "name";
/// Record field holding the activation flag as `0` or `1`.
pub const FIELD_IS_ACTIVATED: &str = "isActivated";

/// Returns `true` for characters that count towards the name limit.
///
/// Only CJK Unified Ideographs (U+4E00..=U+9FFF) are counted; Latin text,
/// digits, punctuation and emoji are free.
#[must_use]
pub const fn is_counted_char(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}')
}

/// Counts the characters of `name` that fall under the name limit.
#[must_use]
pub fn counted_chars(name: &str) -> usize {
    name.chars().filter(|c| is_counted_char(*c)).count()
}

/// A task as stored in the record service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Immutable unique identifier.
    pub id: RecordId,
    /// Display name.
    pub name: String,
    /// Whether this task is the activated one.
    pub is_activated: bool,
}

impl TaskRecord {
    /// Creates a fresh, inactive task with a newly generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::generate(),
            name: name.into(),
            is_activated: false,
        }
    }

    /// Converts this task into its generic record form.
    #[must_use]
    pub fn to_record(&self) -> Record {
        Record::new(self.id.clone(), RecordType::Task)
            .with(FIELD_ID, FieldValue::Text(self.id.as_str().to_string()))
            .with(FIELD_NAME, FieldValue::Text(self.name.clone()))
            .with(FIELD_IS_ACTIVATED, activation_value(self.is_activated))
    }

    /// Parses a generic record into a task.
    ///
    /// A missing `isActivated` field reads as inactive.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the record is not a task, has no name, or
    /// carries an activation flag other than `0` or `1`.
    pub fn from_record(record: &Record) -> Result<Self, RecordError> {
        if record.record_type != RecordType::Task {
            return Err(RecordError::WrongType {
                expected: RecordType::Task,
                found: record.record_type,
            });
        }

        let name = record
            .get(FIELD_NAME)
            .ok_or(RecordError::MissingField(FIELD_NAME))?
            .as_text()
            .ok_or_else(|| RecordError::InvalidField {
                field: FIELD_NAME,
                reason: "expected text".to_string(),
            })?
            .to_string();

        let is_activated = match record.get(FIELD_IS_ACTIVATED) {
            None => false,
            Some(value) => parse_activation(value)?,
        };

        Ok(Self {
            id: record.id.clone(),
            name,
            is_activated,
        })
    }
}

/// Encodes an activation flag the way the record service stores it.
#[must_use]
pub const fn activation_value(is_activated: bool) -> FieldValue {
    FieldValue::Int(if is_activated { 1 } else { 0 })
}

/// Decodes an `isActivated` field value.
///
/// # Errors
///
/// Returns [`RecordError::InvalidField`] unless the value is `Int(0)` or `Int(1)`.
pub fn parse_activation(value: &FieldValue) -> Result<bool, RecordError> {
    match value {
        FieldValue::Int(0) => Ok(false),
        FieldValue::Int(1) => Ok(true),
        other => Err(RecordError::InvalidField {
            field: FIELD_IS_ACTIVATED,
            reason: format!("expected 0 or 1, got {other:?}"),
        }),
    }
}
