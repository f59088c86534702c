use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RawRecord;

pub const DEFAULT_RING_CAPACITY: usize = 10;

/// Append-only log that drops its oldest entry once `capacity` is exceeded
#[derive(Debug, Clone)]
pub struct RingLog<T> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T> RingLog<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `entry`, returning the entry that fell off the front, if any
    pub fn push(&mut self, entry: T) -> Option<T> {
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }
}

impl<T: Clone> RingLog<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

/// Named copy of the record set at the time it was saved
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub data: Vec<RawRecord>,
}

impl Snapshot {
    pub fn new(name: impl Into<String>, data: Vec<RawRecord>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            data,
        }
    }
}

/// A mutating user action, kept for undo/debug views
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: Uuid,
    pub action: String,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl HistoryRecord {
    pub fn new(action: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.into(),
            created_at: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_keeps_most_recent_ten() {
        let mut ring = RingLog::new(DEFAULT_RING_CAPACITY);
        let mut dropped = Vec::new();
        for i in 0..11 {
            if let Some(old) = ring.push(Snapshot::new(format!("save {i}"), vec![])) {
                dropped.push(old.name);
            }
        }

        assert_eq!(ring.len(), 10);
        assert_eq!(dropped, vec!["save 0".to_string()]);
        assert_eq!(ring.iter().next().unwrap().name, "save 1");
        assert_eq!(ring.latest().unwrap().name, "save 10");
    }

    #[test]
    fn test_history_records_have_unique_ids() {
        let a = HistoryRecord::new("import", serde_json::json!({ "records": 3 }));
        let b = HistoryRecord::new("import", serde_json::json!({ "records": 3 }));
        assert_ne!(a.id, b.id);
    }
}
