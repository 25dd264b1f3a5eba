use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::engine::records::GroupRecord;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The stored bytes exist but do not decode into a `GroupRecord`.
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("serialization error: {0}")]
    Serialize(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for group records. One record per group id; `save` must
/// replace the whole record atomically.
#[async_trait]
pub trait GroupBackend: Send + Sync {
    /// `Ok(None)` when the group has never been saved.
    async fn load(&self, group_id: &str) -> Result<Option<GroupRecord>, BackendError>;

    async fn save(&self, group_id: &str, record: &GroupRecord) -> Result<(), BackendError>;
}

pub fn encode_record(record: &GroupRecord) -> Result<String, BackendError> {
    serde_json::to_string(record).map_err(|e| BackendError::Serialize(e.to_string()))
}

pub fn decode_record(raw: &str) -> Result<GroupRecord, BackendError> {
    serde_json::from_str(raw).map_err(|e| BackendError::Corrupt(e.to_string()))
}

/// In-process backend holding serialized records. Used for tests and for
/// `backend = "memory"` deployments; supports failure injection.
#[derive(Default)]
pub struct MemoryBackend {
    records: DashMap<String, String>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    save_delay_ms: AtomicU64,
    saves: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every `save` sleep first, to hold a group lock open in tests.
    pub fn set_save_delay(&self, delay: Duration) {
        self.save_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Store raw bytes as-is, bypassing encoding.
    pub fn insert_raw(&self, group_id: &str, raw: &str) {
        self.records.insert(group_id.to_string(), raw.to_string());
    }

    pub fn raw(&self, group_id: &str) -> Option<String> {
        self.records.get(group_id).map(|r| r.value().clone())
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GroupBackend for MemoryBackend {
    async fn load(&self, group_id: &str) -> Result<Option<GroupRecord>, BackendError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("reads disabled".into()));
        }
        // Clone out before decoding so no shard guard is held.
        let raw = self.raw(group_id);
        raw.as_deref().map(decode_record).transpose()
    }

    async fn save(&self, group_id: &str, record: &GroupRecord) -> Result<(), BackendError> {
        let delay = self.save_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("writes disabled".into()));
        }
        let raw = encode_record(record)?;
        self.records.insert(group_id.to_string(), raw);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
