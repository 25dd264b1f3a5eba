use async_trait::async_trait;
use sqlx::SqlitePool;

use super::backend::{BackendError, GroupBackend, decode_record, encode_record};
use crate::engine::records::GroupRecord;

/// Group records stored as JSON documents in the `group_records` table.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Expects `run_migrations` to have been applied to `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupBackend for SqliteBackend {
    async fn load(&self, group_id: &str) -> Result<Option<GroupRecord>, BackendError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT record FROM group_records WHERE group_id = ?")
                .bind(group_id)
                .fetch_optional(&self.pool)
                .await?;
        raw.as_deref().map(decode_record).transpose()
    }

    async fn save(&self, group_id: &str, record: &GroupRecord) -> Result<(), BackendError> {
        let raw = encode_record(record)?;
        sqlx::query(
            "INSERT INTO group_records (group_id, record, updated_at) VALUES (?, ?, datetime('now')) \
             ON CONFLICT(group_id) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at",
        )
        .bind(group_id)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::engine::permissions::Rank;

    async fn setup_backend() -> (SqliteBackend, SqlitePool) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        (SqliteBackend::new(pool.clone()), pool)
    }

    #[tokio::test]
    async fn test_load_missing_group() {
        let (backend, _pool) = setup_backend().await;
        assert!(backend.load("g1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (backend, _pool) = setup_backend().await;
        let mut record = GroupRecord::default();
        record.member_mut("alice").rank = Rank::OWNER;
        record.settings.rules = "Be kind".into();
        backend.save("g1", &record).await.unwrap();

        let loaded = backend.load("g1").await.unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn test_save_overwrites_single_row() {
        let (backend, pool) = setup_backend().await;
        let mut record = GroupRecord::default();
        backend.save("g1", &record).await.unwrap();
        record.stats.message_count = 42;
        backend.save("g1", &record).await.unwrap();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM group_records")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
        let loaded = backend.load("g1").await.unwrap().unwrap();
        assert_eq!(loaded.stats.message_count, 42);
    }

    #[tokio::test]
    async fn test_corrupt_row_reports_corrupt() {
        let (backend, pool) = setup_backend().await;
        sqlx::query("INSERT INTO group_records (group_id, record) VALUES ('g1', 'garbage')")
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(
            backend.load("g1").await,
            Err(BackendError::Corrupt(_))
        ));
    }
}
