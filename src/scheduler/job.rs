use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single test request waiting to be executed on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub source_id: u32,
    pub request_id: u32,
}

impl WorkItem {
    pub fn new(source_id: u32, request_id: u32) -> Self {
        Self {
            source_id,
            request_id,
        }
    }

    /// Key used to pick the "oldest" entry for both eviction and dispatch.
    pub fn order_key(&self) -> (u32, u32) {
        (self.source_id, self.request_id)
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.source_id, self.request_id)
    }
}

/// An occupied slot of the bounded queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub slot: u32,
    pub item: WorkItem,
    pub arrival_time: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(slot: u32, item: WorkItem) -> Self {
        Self {
            slot,
            item,
            arrival_time: Utc::now(),
        }
    }

    /// `(source_id, request_id, slot)`; the slot only breaks ties between equal pairs.
    pub fn sort_key(&self) -> (u32, u32, u32) {
        let (source_id, request_id) = self.item.order_key();
        (source_id, request_id, self.slot)
    }
}

/// An evicted entry parked in the overflow mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashEntry {
    pub item: WorkItem,
    pub arrival_time: DateTime<Utc>,
    pub removal_time: DateTime<Utc>,
    pub acknowledged: bool,
}

impl TrashEntry {
    pub fn new(item: WorkItem, arrival_time: DateTime<Utc>, removal_time: DateTime<Utc>) -> Self {
        Self {
            item,
            arrival_time,
            removal_time,
            acknowledged: false,
        }
    }

    /// Convert an evicted queue entry, stamping the removal time.
    pub fn from_evicted(entry: QueueEntry, removal_time: DateTime<Utc>) -> Self {
        Self::new(entry.item, entry.arrival_time, removal_time)
    }
}
