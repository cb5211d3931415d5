use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roadmap_core::model::{ProgressRecord, RoadmapId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by cache adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// What a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Every progress record of the current user.
    ProgressList,
    /// The current user's progress on one roadmap.
    Roadmap(RoadmapId),
}

impl CacheKey {
    /// Stable textual form, used as the row key by persistent caches.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match self {
            CacheKey::ProgressList => "progress".to_string(),
            CacheKey::Roadmap(id) => format!("progress:{id}"),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// A cached value plus its freshness.
///
/// A stale entry is still readable but the next reader is expected to refetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    #[must_use]
    pub fn fresh(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            stale: false,
            fetched_at,
        }
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        !self.stale
    }
}

/// Local progress cache shared by readers, the mutator and push invalidation.
#[async_trait]
pub trait ProgressCache: Send + Sync {
    /// Cached progress list, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    async fn list(&self) -> Result<Option<CacheEntry<Vec<ProgressRecord>>>, StorageError>;

    /// Replace the cached progress list with a fresh value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn store_list(
        &self,
        records: &[ProgressRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Cached progress for one roadmap. `Some(entry)` with `entry.value == None`
    /// means "the user has no record for this roadmap".
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    async fn roadmap(
        &self,
        id: RoadmapId,
    ) -> Result<Option<CacheEntry<Option<ProgressRecord>>>, StorageError>;

    /// Replace the cached progress for one roadmap with a fresh value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn store_roadmap(
        &self,
        id: RoadmapId,
        record: Option<&ProgressRecord>,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Mark an entry stale. Returns `false` when nothing was cached under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the flag cannot be written.
    async fn invalidate(&self, key: CacheKey) -> Result<bool, StorageError>;

    /// Mark every entry stale. Returns how many entries were marked.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the flags cannot be written.
    async fn invalidate_all(&self) -> Result<u64, StorageError>;
}

#[derive(Debug, Clone)]
enum Cached {
    List(CacheEntry<Vec<ProgressRecord>>),
    Record(CacheEntry<Option<ProgressRecord>>),
}

/// In-memory cache, the default for a single session.
#[derive(Clone, Default)]
pub struct InMemoryProgressCache {
    entries: Arc<Mutex<HashMap<CacheKey, Cached>>>,
}

impl InMemoryProgressCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressCache for InMemoryProgressCache {
    async fn list(&self) -> Result<Option<CacheEntry<Vec<ProgressRecord>>>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        match guard.get(&CacheKey::ProgressList) {
            Some(Cached::List(entry)) => Ok(Some(entry.clone())),
            Some(Cached::Record(_)) => Err(StorageError::Serialization(
                "progress list slot holds a single record".into(),
            )),
            None => Ok(None),
        }
    }

    async fn store_list(
        &self,
        records: &[ProgressRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            CacheKey::ProgressList,
            Cached::List(CacheEntry::fresh(records.to_vec(), fetched_at)),
        );
        Ok(())
    }

    async fn roadmap(
        &self,
        id: RoadmapId,
    ) -> Result<Option<CacheEntry<Option<ProgressRecord>>>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        match guard.get(&CacheKey::Roadmap(id)) {
            Some(Cached::Record(entry)) => Ok(Some(entry.clone())),
            Some(Cached::List(_)) => Err(StorageError::Serialization(format!(
                "roadmap {id} slot holds a list"
            ))),
            None => Ok(None),
        }
    }

    async fn store_roadmap(
        &self,
        id: RoadmapId,
        record: Option<&ProgressRecord>,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            CacheKey::Roadmap(id),
            Cached::Record(CacheEntry::fresh(record.cloned(), fetched_at)),
        );
        Ok(())
    }

    async fn invalidate(&self, key: CacheKey) -> Result<bool, StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        match guard.get_mut(&key) {
            Some(Cached::List(entry)) => {
                entry.stale = true;
                Ok(true)
            }
            Some(Cached::Record(entry)) => {
                entry.stale = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn invalidate_all(&self) -> Result<u64, StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        for cached in guard.values_mut() {
            match cached {
                Cached::List(entry) => entry.stale = true,
                Cached::Record(entry) => entry.stale = true,
            }
        }
        Ok(guard.len() as u64)
    }
}

/// Cache handle behind a trait object so the backend can be swapped.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressCache>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            progress: Arc::new(InMemoryProgressCache::new()),
        }
    }
}
