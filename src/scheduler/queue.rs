use std::sync::Arc;

use chrono::Utc;

use crate::error::{DispatcherError, Result};
use crate::scheduler::allocator::SlotAllocator;
use crate::scheduler::job::{QueueEntry, TrashEntry, WorkItem};
use crate::storage::Store;

/// Where an inserted item landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    pub slot: u32,
    pub evicted: Option<TrashEntry>,
}

/// Bounded, position-indexed queue of pending work items.
///
/// Capacity is fixed at `max_size` slots. Inserting into a full queue evicts
/// the entry with the smallest `(source_id, request_id)` into the overflow
/// mailbox and reuses its slot.
pub struct SlotQueue {
    store: Arc<Store>,
    allocator: SlotAllocator,
}

impl SlotQueue {
    /// Attach a queue of `max_size` slots to `store`.
    ///
    /// Fails if `max_size` is zero or the store already holds a slot outside
    /// `[0, max_size)` (a snapshot written with a larger capacity).
    pub async fn open(store: Arc<Store>, max_size: u32) -> Result<Self> {
        if max_size == 0 {
            return Err(DispatcherError::Config(
                "queue max_size must be at least 1".to_string(),
            ));
        }

        if let Some(slot) = store.read(|t| t.max_slot()).await {
            if slot >= max_size {
                return Err(DispatcherError::Config(format!(
                    "stored queue uses slot {} but max_size is {}",
                    slot, max_size
                )));
            }
        }

        Ok(Self {
            store,
            allocator: SlotAllocator::new(max_size),
        })
    }

    pub fn max_size(&self) -> u32 {
        self.allocator.capacity()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Number of occupied slots.
    pub async fn occupancy(&self) -> Result<u32> {
        Ok(self.store.read(|t| t.queue_len() as u32).await)
    }

    pub async fn available_space(&self) -> Result<u32> {
        let occupancy = self.occupancy().await?;
        Ok(self.max_size().saturating_sub(occupancy))
    }

    /// Store `item` in the next free slot, evicting if the queue is full.
    ///
    /// Slot selection, eviction and the write commit as one transaction;
    /// concurrent inserts never claim the same slot.
    pub async fn insert(&self, item: WorkItem) -> Result<InsertOutcome> {
        let allocator = self.allocator;
        let outcome = self
            .store
            .transaction(move |tables| {
                let allocation = allocator.allocate(tables, Utc::now())?;
                tables
                    .queue
                    .insert(allocation.slot, QueueEntry::new(allocation.slot, item));
                tables.next_slot = (allocation.slot + 1) % allocator.capacity();
                Ok(InsertOutcome {
                    slot: allocation.slot,
                    evicted: allocation.evicted,
                })
            })
            .await?;

        tracing::debug!(
            slot = outcome.slot,
            source_id = item.source_id,
            request_id = item.request_id,
            evicted = outcome.evicted.is_some(),
            "Item queued"
        );

        Ok(outcome)
    }

    /// The entry with the smallest `(source_id, request_id)`, left in place.
    pub async fn pop_oldest(&self) -> Result<Option<QueueEntry>> {
        Ok(self
            .store
            .read(|t| t.queue.values().min_by_key(|e| e.sort_key()).cloned())
            .await)
    }

    /// Remove the entry at `slot`. Returns false when the slot was already empty.
    pub async fn delete_slot(&self, slot: u32) -> Result<bool> {
        let removed = self
            .store
            .transaction(move |tables| Ok(tables.queue.remove(&slot).is_some()))
            .await?;

        if !removed {
            tracing::debug!(slot, "Slot already empty on delete");
        }
        Ok(removed)
    }

    /// Remove `entry` only if its slot still holds that exact entry.
    ///
    /// A slot freed by eviction may already hold a newer item; that item is
    /// left alone and false is returned.
    pub async fn delete_entry(&self, entry: &QueueEntry) -> Result<bool> {
        let expected = entry.clone();
        let removed = self
            .store
            .transaction(move |tables| {
                if tables.queue.get(&expected.slot) != Some(&expected) {
                    return Ok(false);
                }
                Ok(tables.queue.remove(&expected.slot).is_some())
            })
            .await?;

        if !removed {
            tracing::debug!(slot = entry.slot, "Entry already gone from slot on delete");
        }
        Ok(removed)
    }

    /// All live entries ordered by `(source_id, request_id)`.
    pub async fn entries(&self) -> Result<Vec<QueueEntry>> {
        Ok(self
            .store
            .read(|t| {
                let mut entries: Vec<QueueEntry> = t.queue.values().cloned().collect();
                entries.sort_by_key(|e| e.sort_key());
                entries
            })
            .await)
    }
}
