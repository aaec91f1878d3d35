use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::scheduler::job::{TrashEntry, WorkItem};
use crate::storage::{Store, Tables};

/// Holds items evicted from the queue until a reader picks them up.
///
/// Reads use deferred deletion: an entry handed out by [`read_pending`]
/// is only marked acknowledged, and is purged by the *next* read.
///
/// [`read_pending`]: OverflowMailbox::read_pending
pub struct OverflowMailbox {
    store: Arc<Store>,
    acknowledge_all_on_read: bool,
}

/// Append an unacknowledged entry; used inside an open transaction.
pub(crate) fn deposit_into(tables: &mut Tables, entry: TrashEntry) {
    tables.overflow.push(entry);
}

impl OverflowMailbox {
    /// `acknowledge_all_on_read` marks every pending entry as read on each
    /// [`read_pending`](Self::read_pending), even though only one is returned.
    pub fn new(store: Arc<Store>, acknowledge_all_on_read: bool) -> Self {
        Self {
            store,
            acknowledge_all_on_read,
        }
    }

    pub async fn deposit(
        &self,
        item: WorkItem,
        arrival_time: DateTime<Utc>,
        removal_time: DateTime<Utc>,
    ) -> Result<()> {
        self.store
            .transaction(move |tables| {
                deposit_into(tables, TrashEntry::new(item, arrival_time, removal_time));
                Ok(())
            })
            .await
    }

    /// Purge acknowledged entries, return the earliest unacknowledged one and
    /// acknowledge it (or all pending ones, depending on configuration).
    pub async fn read_pending(&self) -> Result<Option<TrashEntry>> {
        let acknowledge_all = self.acknowledge_all_on_read;
        let (purged, entry, acknowledged) = self
            .store
            .transaction(move |tables| {
                let before = tables.overflow.len();
                tables.overflow.retain(|e| !e.acknowledged);
                let purged = before - tables.overflow.len();

                let mut acknowledged = 0usize;
                let mut taken = None;
                for e in tables.overflow.iter_mut() {
                    if taken.is_none() {
                        taken = Some(e.clone());
                        e.acknowledged = true;
                        acknowledged += 1;
                    } else if acknowledge_all {
                        e.acknowledged = true;
                        acknowledged += 1;
                    } else {
                        break;
                    }
                }
                Ok((purged, taken, acknowledged))
            })
            .await?;

        if acknowledged > 1 {
            tracing::warn!(
                acknowledged,
                "Multiple overflow entries acknowledged by a single read"
            );
        }
        tracing::debug!(purged, found = entry.is_some(), "Read overflow mailbox");

        Ok(entry)
    }

    /// Entries not yet handed to a reader.
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self
            .store
            .read(|t| t.overflow.iter().filter(|e| !e.acknowledged).count())
            .await)
    }
}
