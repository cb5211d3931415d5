use std::sync::Arc;

use roadmap_core::aggregate::{self, RoadmapOverview};
use roadmap_core::model::{ProgressRecord, RoadmapId};
use storage::repository::{CacheEntry, ProgressCache};

use crate::Clock;
use crate::api::ProgressApi;
use crate::error::QueryError;

/// Read side of the progress cache: fresh entries are served locally, stale or
/// missing ones are refetched and stored.
#[derive(Clone)]
pub struct ProgressQueries {
    clock: Clock,
    api: Arc<dyn ProgressApi>,
    cache: Arc<dyn ProgressCache>,
}

impl ProgressQueries {
    #[must_use]
    pub fn new(clock: Clock, api: Arc<dyn ProgressApi>, cache: Arc<dyn ProgressCache>) -> Self {
        Self { clock, api, cache }
    }

    /// All progress records of the current user.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the cache or the API fails.
    pub async fn list(&self) -> Result<Vec<ProgressRecord>, QueryError> {
        if let Some(entry) = self.cache.list().await?.filter(CacheEntry::is_fresh) {
            return Ok(entry.value);
        }

        tracing::debug!("progress list stale or missing, refetching");
        let records = self.api.list_progress(None).await?;
        self.cache.store_list(&records, self.clock.now()).await?;
        Ok(records)
    }

    /// The current user's record for one roadmap, `None` if never started.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the cache or the API fails.
    pub async fn for_roadmap(
        &self,
        roadmap_id: RoadmapId,
    ) -> Result<Option<ProgressRecord>, QueryError> {
        if let Some(entry) = self
            .cache
            .roadmap(roadmap_id)
            .await?
            .filter(CacheEntry::is_fresh)
        {
            return Ok(entry.value);
        }

        tracing::debug!(roadmap = %roadmap_id, "roadmap progress stale or missing, refetching");
        let record = self
            .api
            .list_progress(Some(roadmap_id))
            .await?
            .into_iter()
            .find(|r| r.roadmap_id == roadmap_id);
        self.cache
            .store_roadmap(roadmap_id, record.as_ref(), self.clock.now())
            .await?;
        Ok(record)
    }

    /// Record for the "continue learning" view.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the cache or the API fails.
    pub async fn most_recent(&self) -> Result<Option<ProgressRecord>, QueryError> {
        let records = self.list().await?;
        Ok(aggregate::most_recent(&records).cloned())
    }

    /// Per-section percentages, overall percentage and current section.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the cache or the API fails.
    pub async fn overview(
        &self,
        roadmap_id: RoadmapId,
    ) -> Result<Option<RoadmapOverview>, QueryError> {
        let record = self.for_roadmap(roadmap_id).await?;
        Ok(record.map(|r| aggregate::overview(&r.progress)))
    }
}
