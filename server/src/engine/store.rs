use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::errors::StoreError;
use super::records::GroupRecord;
use crate::db::backend::{BackendError, GroupBackend};

/// Cached record for one group; `None` until first loaded from the backend.
type Slot = Arc<Mutex<Option<GroupRecord>>>;

/// Owner of every group record. All reads and writes of a group go through
/// that group's lock, so read-modify-write cycles on one group never
/// interleave while different groups proceed independently.
///
/// A loaded record stays cached in its slot until `evict_idle` drops it;
/// without sweeps the cache grows with every group the process touches.
pub struct GroupStore {
    backend: Arc<dyn GroupBackend>,
    slots: DashMap<String, Slot>,
    lock_timeout: Duration,
}

impl GroupStore {
    pub fn new(backend: Arc<dyn GroupBackend>, lock_timeout: Duration) -> Self {
        Self {
            backend,
            slots: DashMap::new(),
            lock_timeout,
        }
    }

    /// Drop cached slots nobody holds or waits on. The next access reloads
    /// the record from the backend. Returns how many slots were dropped.
    pub fn evict_idle(&self) -> usize {
        let before = self.slots.len();
        // Every lock holder and waiter owns a clone of the slot `Arc`.
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        let evicted = before.saturating_sub(self.slots.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.slots.len(), "evicted idle group slots");
        }
        evicted
    }

    fn slot(&self, group_id: &str) -> Slot {
        // The DashMap guard is released at the end of this statement.
        self.slots
            .entry(group_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn acquire(
        &self,
        group_id: &str,
    ) -> Result<tokio::sync::OwnedMutexGuard<Option<GroupRecord>>, StoreError> {
        let slot = self.slot(group_id);
        match tokio::time::timeout(self.lock_timeout, slot.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!(%group_id, timeout_ms = self.lock_timeout.as_millis() as u64, "group lock timeout");
                Err(StoreError::LockTimeout {
                    group_id: group_id.to_string(),
                    waited: self.lock_timeout,
                })
            }
        }
    }

    async fn load_or_default(&self, group_id: &str) -> Result<GroupRecord, StoreError> {
        match self.backend.load(group_id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Ok(GroupRecord::default()),
            Err(BackendError::Corrupt(reason)) => {
                warn!(%group_id, %reason, "corrupt group record replaced with defaults");
                Ok(GroupRecord::default())
            }
            Err(source) => {
                error!(%group_id, error = %source, "failed to load group record");
                Err(StoreError::ReadFailure {
                    group_id: group_id.to_string(),
                    source,
                })
            }
        }
    }

    /// Run `f` against the group's record under exclusive access and persist
    /// the result.
    ///
    /// `f` works on a copy: if it returns `Err`, or the backend write fails,
    /// the committed record is left exactly as it was. The closure is
    /// synchronous, so no borrow of the record can outlive the section.
    pub async fn with_group<T, E, F>(&self, group_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut GroupRecord) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self.acquire(group_id).await?;
        let committed = match guard.take() {
            Some(record) => record,
            None => self.load_or_default(group_id).await?,
        };

        let mut working = committed.clone();
        let value = match f(&mut working) {
            Ok(value) => value,
            Err(e) => {
                *guard = Some(committed);
                return Err(e);
            }
        };

        if let Err(source) = self.backend.save(group_id, &working).await {
            error!(%group_id, error = %source, "failed to persist group record, rolled back");
            *guard = Some(committed);
            return Err(StoreError::WriteFailure {
                group_id: group_id.to_string(),
                source,
            }
            .into());
        }

        *guard = Some(working);
        Ok(value)
    }

    /// Snapshot of the group's committed record. Serialized with writers, so
    /// it never observes a half-applied update. Does not persist anything.
    pub async fn read_group(&self, group_id: &str) -> Result<GroupRecord, StoreError> {
        let mut guard = self.acquire(group_id).await?;
        let record = match guard.take() {
            Some(record) => record,
            None => self.load_or_default(group_id).await?,
        };
        *guard = Some(record.clone());
        Ok(record)
    }
}
