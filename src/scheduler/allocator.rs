use chrono::{DateTime, Utc};

use crate::error::{DispatcherError, Result};
use crate::scheduler::job::TrashEntry;
use crate::scheduler::mailbox;
use crate::storage::Tables;

/// Result of finding room for a new entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub slot: u32,
    /// Entry pushed out to the overflow mailbox to make room, if any.
    pub evicted: Option<TrashEntry>,
}

/// Round-robin slot allocation over `[0, capacity)`.
///
/// Operates on a staged copy of the tables inside a store transaction, so
/// the cursor update, the eviction and the caller's insert commit together.
#[derive(Debug, Clone, Copy)]
pub struct SlotAllocator {
    capacity: u32,
}

impl SlotAllocator {
    pub fn new(capacity: u32) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Find a writable slot, evicting the oldest entry when every slot is taken.
    pub fn allocate(&self, tables: &mut Tables, now: DateTime<Utc>) -> Result<Allocation> {
        if let Some(slot) = self.scan(tables) {
            return Ok(Allocation {
                slot,
                evicted: None,
            });
        }

        let evicted = self.evict(tables, now)?;
        Ok(Allocation {
            slot: tables.next_slot,
            evicted: Some(evicted),
        })
    }

    /// Walk forward from the cursor looking for a free slot.
    ///
    /// The cursor follows the walk; after `capacity` probes it is back where
    /// it started and the queue is full.
    fn scan(&self, tables: &mut Tables) -> Option<u32> {
        let mut cursor = tables.next_slot % self.capacity;
        for _ in 0..self.capacity {
            if !tables.queue.contains_key(&cursor) {
                tables.next_slot = cursor;
                return Some(cursor);
            }
            cursor = (cursor + 1) % self.capacity;
        }
        tables.next_slot = cursor;
        None
    }

    /// Move the smallest `(source_id, request_id)` entry to the overflow
    /// mailbox and point the cursor at the slot it freed.
    fn evict(&self, tables: &mut Tables, now: DateTime<Utc>) -> Result<TrashEntry> {
        let slot = tables
            .queue
            .values()
            .min_by_key(|entry| entry.sort_key())
            .map(|entry| entry.slot)
            .ok_or_else(|| {
                DispatcherError::Storage("no free slot but the queue holds no entries".to_string())
            })?;

        let entry = tables.queue.remove(&slot).ok_or_else(|| {
            DispatcherError::Storage(format!("eviction candidate vanished from slot {}", slot))
        })?;

        let trash = TrashEntry::from_evicted(entry, now);
        mailbox::deposit_into(tables, trash.clone());
        tables.next_slot = slot;

        tracing::info!(
            slot,
            source_id = trash.item.source_id,
            request_id = trash.item.request_id,
            "Queue full, evicted oldest entry to overflow"
        );

        Ok(trash)
    }
}
