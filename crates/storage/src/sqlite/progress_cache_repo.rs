use chrono::{DateTime, Utc};
use roadmap_core::model::{ProgressRecord, RoadmapId};
use serde::de::DeserializeOwned;

use super::SqliteRepository;
use super::mapping::{encode_payload, map_entry_row};
use crate::repository::{CacheEntry, CacheKey, ProgressCache, StorageError};

impl SqliteRepository {
    async fn read_entry<T: DeserializeOwned>(
        &self,
        key: CacheKey,
    ) -> Result<Option<CacheEntry<T>>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT payload, stale, fetched_at
                FROM progress_cache
                WHERE owner = ?1 AND cache_key = ?2
            ",
        )
        .bind(self.owner())
        .bind(key.storage_key())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_entry_row::<T>).transpose()
    }

    async fn write_entry(
        &self,
        key: CacheKey,
        payload: String,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO progress_cache (owner, cache_key, payload, stale, fetched_at)
                VALUES (?1, ?2, ?3, 0, ?4)
                ON CONFLICT(owner, cache_key) DO UPDATE SET
                    payload = excluded.payload,
                    stale = 0,
                    fetched_at = excluded.fetched_at
            ",
        )
        .bind(self.owner())
        .bind(key.storage_key())
        .bind(payload)
        .bind(fetched_at)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProgressCache for SqliteRepository {
    async fn list(&self) -> Result<Option<CacheEntry<Vec<ProgressRecord>>>, StorageError> {
        self.read_entry(CacheKey::ProgressList).await
    }

    async fn store_list(
        &self,
        records: &[ProgressRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let payload = encode_payload(records)?;
        self.write_entry(CacheKey::ProgressList, payload, fetched_at)
            .await
    }

    async fn roadmap(
        &self,
        id: RoadmapId,
    ) -> Result<Option<CacheEntry<Option<ProgressRecord>>>, StorageError> {
        self.read_entry(CacheKey::Roadmap(id)).await
    }

    async fn store_roadmap(
        &self,
        id: RoadmapId,
        record: Option<&ProgressRecord>,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let payload = encode_payload(&record)?;
        self.write_entry(CacheKey::Roadmap(id), payload, fetched_at)
            .await
    }

    async fn invalidate(&self, key: CacheKey) -> Result<bool, StorageError> {
        let res = sqlx::query(
            "UPDATE progress_cache SET stale = 1 WHERE owner = ?1 AND cache_key = ?2",
        )
        .bind(self.owner())
        .bind(key.storage_key())
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(res.rows_affected() > 0)
    }

    async fn invalidate_all(&self) -> Result<u64, StorageError> {
        let res = sqlx::query("UPDATE progress_cache SET stale = 1 WHERE owner = ?1")
            .bind(self.owner())
            .execute(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(res.rows_affected())
    }
}
