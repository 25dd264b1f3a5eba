use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use super::backend::{BackendError, GroupBackend, decode_record, encode_record};
use crate::engine::records::GroupRecord;

/// One JSON file per group under a data directory.
pub struct JsonDirBackend {
    dir: PathBuf,
}

impl JsonDirBackend {
    /// Creates the directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, BackendError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, group_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(group_id)))
    }
}

/// Map a group id onto a safe file stem. ASCII alphanumerics, `-` and `_`
/// pass through; every other byte becomes `%XX`.
fn file_stem(group_id: &str) -> String {
    let mut out = String::with_capacity(group_id.len());
    for b in group_id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[async_trait]
impl GroupBackend for JsonDirBackend {
    async fn load(&self, group_id: &str) -> Result<Option<GroupRecord>, BackendError> {
        match tokio::fs::read_to_string(self.path_for(group_id)).await {
            Ok(raw) => decode_record(&raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Err(BackendError::Corrupt(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, group_id: &str, record: &GroupRecord) -> Result<(), BackendError> {
        let raw = encode_record(record)?;
        let target = self.path_for(group_id);
        // Write beside the target and rename over it so readers never see a torn file.
        let tmp = self.dir.join(format!(".{}.{}.tmp", file_stem(group_id), Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&tmp, raw.as_bytes()).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}
