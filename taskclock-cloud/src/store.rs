//! In-memory per-user record zones.
//!
//! The [`RecordStore`] keeps one isolated zone per user id. Each zone maps
//! record ids to records and remembers the order in which ids were first
//! saved, so queries return records oldest first.

use std::collections::HashMap;

use taskclock_proto::cloud::Predicate;
use taskclock_proto::record::{Record, RecordId, RecordType};
use tokio::sync::RwLock;

/// Default maximum number of records per user zone.
pub const DEFAULT_MAX_RECORDS_PER_USER: usize = 10_000;

/// Errors returned by [`RecordStore::save`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ZoneError {
    /// The user's zone already holds the maximum number of records.
    #[error("record zone for {user_id} is full ({max} records)")]
    ZoneFull {
        /// Owner of the zone.
        user_id: String,
        /// Configured maximum.
        max: usize,
    },
}

/// One user's records.
#[derive(Debug, Default)]
struct Zone {
    /// Record id to (first-save sequence number, record).
    records: HashMap<RecordId, (u64, Record)>,
    /// Sequence number for the next new id.
    next_seq: u64,
}

/// Per-user record zones behind an async [`RwLock`].
pub struct RecordStore {
    zones: RwLock<HashMap<String, Zone>>,
    max_records_per_user: usize,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    /// Creates an empty store with the default per-user limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_records(DEFAULT_MAX_RECORDS_PER_USER)
    }

    /// Creates an empty store with a custom per-user limit.
    #[must_use]
    pub fn with_max_records(max_records_per_user: usize) -> Self {
        Self {
            zones: RwLock::new(HashMap::new()),
            max_records_per_user,
        }
    }

    /// Returns a copy of `id` from `user_id`'s zone.
    pub async fn fetch(&self, user_id: &str, id: &RecordId) -> Option<Record> {
        let zones = self.zones.read().await;
        zones
            .get(user_id)
            .and_then(|zone| zone.records.get(id))
            .map(|(_, record)| record.clone())
    }

    /// Inserts or replaces a record. Replacing keeps its original position.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError::ZoneFull`] when inserting a new id into a zone
    /// that is already at capacity. Replacing an existing id always succeeds.
    pub async fn save(&self, user_id: &str, record: Record) -> Result<Record, ZoneError> {
        let mut zones = self.zones.write().await;
        let zone = zones.entry(user_id.to_string()).or_default();

        if let Some((_, existing)) = zone.records.get_mut(&record.id) {
            existing.clone_from(&record);
            return Ok(record);
        }
        if zone.records.len() >= self.max_records_per_user {
            return Err(ZoneError::ZoneFull {
                user_id: user_id.to_string(),
                max: self.max_records_per_user,
            });
        }
        let seq = zone.next_seq;
        zone.next_seq += 1;
        zone.records.insert(record.id.clone(), (seq, record.clone()));
        drop(zones);
        Ok(record)
    }

    /// Removes a record, returning whether it existed.
    pub async fn delete(&self, user_id: &str, id: &RecordId) -> bool {
        let mut zones = self.zones.write().await;
        zones
            .get_mut(user_id)
            .is_some_and(|zone| zone.records.remove(id).is_some())
    }

    /// Returns the records of `record_type` matching `predicate`, oldest first.
    pub async fn query(
        &self,
        user_id: &str,
        record_type: RecordType,
        predicate: &Predicate,
    ) -> Vec<Record> {
        let zones = self.zones.read().await;
        let Some(zone) = zones.get(user_id) else {
            return Vec::new();
        };
        let mut matching: Vec<&(u64, Record)> = zone
            .records
            .values()
            .filter(|(_, r)| r.record_type == record_type && predicate.matches(r))
            .collect();
        matching.sort_by_key(|(seq, _)| *seq);
        matching.into_iter().map(|(_, r)| r.clone()).collect()
    }

    /// Number of records in `user_id`'s zone.
    pub async fn record_count(&self, user_id: &str) -> usize {
        let zones = self.zones.read().await;
        zones.get(user_id).map_or(0, |zone| zone.records.len())
    }
}
