use std::sync::Arc;

use roadmap_core::aggregate::{self, SectionProgress};
use roadmap_core::model::{NodeId, ProgressRecord, ProgressTree, RoadmapId, UserId};
use roadmap_core::state::Transition;
use storage::repository::{CacheKey, ProgressCache};

use crate::Clock;
use crate::api::{ProgressApi, UpsertProgress};
use crate::error::ToggleError;
use crate::queries::ProgressQueries;

/// Result of a durable toggle.
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleOutcome {
    pub transition: Transition,
    /// Record as stored by the server after the tree upsert.
    pub record: ProgressRecord,
    /// Progress of the section that contains the toggled node.
    pub section: SectionProgress,
    /// `true` when this toggle created the user's record for the roadmap.
    pub created: bool,
}

/// Applies node clicks: local state first, then the node-level write, then the
/// full-tree upsert.
#[derive(Clone)]
pub struct ProgressMutator {
    clock: Clock,
    user_id: UserId,
    api: Arc<dyn ProgressApi>,
    cache: Arc<dyn ProgressCache>,
    queries: ProgressQueries,
}

impl ProgressMutator {
    #[must_use]
    pub fn new(
        clock: Clock,
        user_id: UserId,
        api: Arc<dyn ProgressApi>,
        cache: Arc<dyn ProgressCache>,
    ) -> Self {
        let queries = ProgressQueries::new(clock, Arc::clone(&api), Arc::clone(&cache));
        Self {
            clock,
            user_id,
            api,
            cache,
            queries,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Advance one node by one click and persist it.
    ///
    /// The node-level call is awaited before the tree upsert starts. Concurrent
    /// toggles are not serialized; the last write to reach the server wins.
    ///
    /// # Errors
    ///
    /// - `ToggleError::Model` if the section or node does not exist (nothing is sent).
    /// - `ToggleError::NodeWrite` if the node-level call fails; the tree is not sent
    ///   and the optimistic local state is kept.
    /// - `ToggleError::PartialWrite` if the node-level call succeeded but the tree
    ///   upsert failed; cached progress is invalidated so the next read refetches.
    pub async fn toggle_node(
        &self,
        roadmap_id: RoadmapId,
        section_index: usize,
        node_id: &NodeId,
    ) -> Result<ToggleOutcome, ToggleError> {
        let existing = self.queries.for_roadmap(roadmap_id).await?;
        let created = existing.is_none();
        let tree = match &existing {
            Some(record) => record.progress.clone(),
            None => {
                let roadmap = self
                    .api
                    .fetch_roadmap(roadmap_id)
                    .await
                    .map_err(ToggleError::Roadmap)?;
                ProgressTree::from_roadmap(&roadmap)
            }
        };

        let transition = tree.plan_toggle(section_index, node_id)?;
        let next_tree = tree.with_node_state(section_index, node_id, transition.to)?;

        if let Some(record) = existing {
            let optimistic = ProgressRecord {
                progress: next_tree.clone(),
                ..record
            };
            self.cache
                .store_roadmap(roadmap_id, Some(&optimistic), self.clock.now())
                .await?;
        }

        tracing::debug!(
            roadmap = %roadmap_id,
            node = %node_id,
            action = %transition.action,
            "sending node progress"
        );
        if let Err(err) = self
            .api
            .set_node_progress(roadmap_id, node_id, transition.action)
            .await
        {
            tracing::warn!(roadmap = %roadmap_id, node = %node_id, error = %err, "node progress write failed");
            return Err(ToggleError::NodeWrite(err));
        }

        let body = UpsertProgress {
            user_id: self.user_id,
            roadmap_id,
            progress: next_tree,
        };
        let record = match self.api.upsert_progress(&body).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    roadmap = %roadmap_id,
                    node = %node_id,
                    error = %err,
                    "node progress saved but tree upsert failed"
                );
                for key in [CacheKey::Roadmap(roadmap_id), CacheKey::ProgressList] {
                    if let Err(err) = self.cache.invalidate(key).await {
                        tracing::warn!(key = %key, error = %err, "cache invalidation failed");
                    }
                }
                return Err(ToggleError::PartialWrite {
                    roadmap_id,
                    node: node_id.clone(),
                    source: err,
                });
            }
        };

        self.cache
            .store_roadmap(roadmap_id, Some(&record), self.clock.now())
            .await?;
        self.cache.invalidate(CacheKey::ProgressList).await?;

        let section = record
            .progress
            .sections()
            .get(section_index)
            .map(aggregate::section_progress)
            .unwrap_or_default();
        Ok(ToggleOutcome {
            transition,
            record,
            section,
            created,
        })
    }
}
