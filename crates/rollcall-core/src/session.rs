//! In-memory attendance session: dedup by identity, arrival order, snapshots.

use crate::types::Identity;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;

/// First sighting of one identity within a session. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub identity_id: String,
    pub name: String,
    pub group: String,
    pub arrived_at: DateTime<Local>,
    /// Zero-based arrival position; gap free.
    pub sequence: usize,
}

/// Consistent copy of a session taken at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub started_at: DateTime<Local>,
    pub records: Vec<AttendanceRecord>,
    pub uploaded: bool,
}

impl SessionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Attendance for the lifetime of one process.
///
/// `records` holds arrival order; `seen` maps identity id to its position in
/// `records`, so its key set is exactly the set of recorded identities.
#[derive(Debug)]
pub struct AttendanceSession {
    id: String,
    started_at: DateTime<Local>,
    records: Vec<AttendanceRecord>,
    seen: HashMap<String, usize>,
    uploaded: bool,
}

impl AttendanceSession {
    pub fn start(started_at: DateTime<Local>) -> Self {
        Self {
            id: session_id_for(&started_at),
            started_at,
            records: Vec::new(),
            seen: HashMap::new(),
            uploaded: false,
        }
    }

    /// Record `identity` if it has not been seen this session.
    ///
    /// Returns the identity's record and whether it was created by this call.
    pub fn mark_if_new(&mut self, identity: &Identity) -> (AttendanceRecord, bool) {
        self.mark_if_new_at(identity, Local::now())
    }

    pub fn mark_if_new_at(
        &mut self,
        identity: &Identity,
        now: DateTime<Local>,
    ) -> (AttendanceRecord, bool) {
        if let Some(&pos) = self.seen.get(&identity.id) {
            return (self.records[pos].clone(), false);
        }

        let record = AttendanceRecord {
            identity_id: identity.id.clone(),
            name: identity.name.clone(),
            group: identity.group.clone(),
            arrived_at: now,
            sequence: self.records.len(),
        };
        self.seen.insert(identity.id.clone(), record.sequence);
        self.records.push(record.clone());
        (record, true)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            started_at: self.started_at,
            records: self.records.clone(),
            uploaded: self.uploaded,
        }
    }

    pub fn mark_uploaded(&mut self) {
        self.uploaded = true;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn contains(&self, identity_id: &str) -> bool {
        self.seen.contains_key(identity_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded
    }
}

/// Remote document key for a session started at `started_at`.
pub fn session_id_for(started_at: &DateTime<Local>) -> String {
    started_at.format("attendance_%Y%m%d_%H%M%S").to_string()
}
