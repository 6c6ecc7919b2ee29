//! Schedule record type.
//!
//! Schedules are stored alongside tasks in the same user zone. Only the
//! record shape lives here; nothing interprets the time window yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{FieldValue, Record, RecordError, RecordId, RecordType};
use crate::task::{FIELD_ID, FIELD_NAME};

/// Record field holding the window start.
pub const FIELD_START_TIME: &str = "startTime";
/// Record field holding the window end.
pub const FIELD_END_TIME: &str = "endTime";

/// A named time window as stored in the record service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    /// Unique identifier.
    pub id: RecordId,
    /// Event name.
    pub name: String,
    /// Window start (UTC).
    pub start_time: DateTime<Utc>,
    /// Window end (UTC).
    pub end_time: DateTime<Utc>,
}

impl ScheduleRecord {
    /// Converts this schedule into its generic record form.
    #[must_use]
    pub fn to_record(&self) -> Record {
        Record::new(self.id.clone(), RecordType::Schedule)
            .with(FIELD_ID, FieldValue::Text(self.id.as_str().to_string()))
            .with(FIELD_NAME, FieldValue::Text(self.name.clone()))
            .with(
                FIELD_START_TIME,
                FieldValue::Timestamp(self.start_time.timestamp_millis()),
            )
            .with(
                FIELD_END_TIME,
                FieldValue::Timestamp(self.end_time.timestamp_millis()),
            )
    }

    /// Parses a generic record into a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the record is not a schedule or any field
    /// is missing or out of range.
    pub fn from_record(record: &Record) -> Result<Self, RecordError> {
        if record.record_type != RecordType::Schedule {
            return Err(RecordError::WrongType {
                expected: RecordType::Schedule,
                found: record.record_type,
            });
        }

        let name = record
            .get(FIELD_NAME)
            .and_then(FieldValue::as_text)
            .ok_or(RecordError::MissingField(FIELD_NAME))?
            .to_string();

        Ok(Self {
            id: record.id.clone(),
            name,
            start_time: read_time(record, FIELD_START_TIME)?,
            end_time: read_time(record, FIELD_END_TIME)?,
        })
    }
}

fn read_time(record: &Record, field: &'static str) -> Result<DateTime<Utc>, RecordError> {
    let millis = record
        .get(field)
        .and_then(FieldValue::as_timestamp)
        .ok_or(RecordError::MissingField(field))?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| RecordError::InvalidField {
        field,
        reason: format!("timestamp {millis} out of range"),
    })
}
