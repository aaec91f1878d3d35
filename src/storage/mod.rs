//! Persistent store backing the slot queue and the overflow mailbox.
//!
//! Both logical tables live behind a single async mutex:
//!
//! - **queue**: `slot -> QueueEntry`, plus the `next_slot` allocation cursor
//! - **overflow**: evicted [`TrashEntry`] rows awaiting a reader
//!
//! Every mutation goes through [`Store::transaction`], which stages the change
//! on a copy of the tables, persists the copy when the store is file-backed,
//! and only then publishes it. A closure that returns an error (or a snapshot
//! write that fails) leaves the published tables untouched.

pub mod snapshot;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::scheduler::job::{QueueEntry, TrashEntry};
use crate::storage::snapshot::SnapshotFile;

/// The full persisted state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pub(crate) queue: BTreeMap<u32, QueueEntry>,
    pub(crate) next_slot: u32,
    pub(crate) overflow: Vec<TrashEntry>,
}

impl Tables {
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    /// Highest occupied slot, if any.
    pub fn max_slot(&self) -> Option<u32> {
        self.queue.keys().next_back().copied()
    }
}

pub struct Store {
    tables: Mutex<Tables>,
    snapshot: Option<SnapshotFile>,
}

impl Store {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            snapshot: None,
        }
    }

    /// Open a file-backed store, loading the previous snapshot when present.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let snapshot = SnapshotFile::new(path);
        let tables = match snapshot.load().await? {
            Some(tables) => {
                tracing::info!(
                    path = %snapshot.path().display(),
                    queued = tables.queue_len(),
                    overflow = tables.overflow_len(),
                    "Loaded queue snapshot"
                );
                tables
            }
            None => {
                tracing::info!(path = %snapshot.path().display(), "No snapshot found, starting empty");
                Tables::default()
            }
        };

        Ok(Self {
            tables: Mutex::new(tables),
            snapshot: Some(snapshot),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Run a read-only closure against the current tables.
    pub async fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let tables = self.tables.lock().await;
        f(&tables)
    }

    /// Run `f` as one atomic transaction.
    ///
    /// The lock is held for the whole call, so transactions are serialized
    /// with each other and with [`Store::read`].
    pub async fn transaction<R>(&self, f: impl FnOnce(&mut Tables) -> Result<R>) -> Result<R> {
        let mut tables = self.tables.lock().await;
        let mut staged = tables.clone();
        let out = f(&mut staged)?;

        if staged != *tables {
            if let Some(ref snapshot) = self.snapshot {
                snapshot.write(&staged).await?;
            }
            *tables = staged;
        }

        Ok(out)
    }
}
