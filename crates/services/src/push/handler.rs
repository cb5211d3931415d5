use std::sync::Arc;

use tokio::sync::broadcast;

use roadmap_core::model::{RoadmapId, UserId};
use storage::repository::{CacheKey, ProgressCache};

use super::message::{ProgressUpdate, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    TopicCompleted,
    TopicUpdated,
    ProgressCreated,
}

/// Transient, user-facing notice raised by a push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub roadmap_id: Option<RoadmapId>,
    pub title: String,
    pub message: String,
}

/// What the handler did with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Acknowledged(Option<UserId>),
    Invalidated(Vec<CacheKey>),
    Ignored,
    Dropped,
}

/// Turns push events into cache invalidations and notifications.
///
/// Invalidation is a hint: readers refetch, the event payload is never applied
/// to the cache directly.
#[derive(Clone)]
pub struct PushEventHandler {
    cache: Arc<dyn ProgressCache>,
    notifications: broadcast::Sender<Notification>,
}

impl PushEventHandler {
    #[must_use]
    pub fn new(cache: Arc<dyn ProgressCache>, capacity: usize) -> Self {
        let (notifications, _) = broadcast::channel(capacity.max(1));
        Self {
            cache,
            notifications,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Decode and dispatch one text frame. Malformed frames are logged and dropped.
    pub async fn handle_text(&self, text: &str) -> Dispatch {
        match ServerMessage::decode(text) {
            Ok(message) => self.handle(message).await,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed push message");
                Dispatch::Dropped
            }
        }
    }

    pub async fn handle(&self, message: ServerMessage) -> Dispatch {
        match message {
            ServerMessage::Authenticated { data } => {
                let user = data.and_then(|d| d.user_id);
                tracing::info!(user = ?user, "push channel authenticated");
                Dispatch::Acknowledged(user)
            }
            ServerMessage::ProgressUpdate {
                data:
                    ProgressUpdate::TopicProgress {
                        roadmap_id,
                        topic,
                        action,
                    },
                ..
            } => {
                let keys = vec![CacheKey::ProgressList, CacheKey::Roadmap(roadmap_id)];
                self.invalidate(&keys).await;
                let completed = action == "complete";
                self.notify(Notification {
                    kind: if completed {
                        NotificationKind::TopicCompleted
                    } else {
                        NotificationKind::TopicUpdated
                    },
                    roadmap_id: Some(roadmap_id),
                    title: "Progress updated".to_string(),
                    message: if completed {
                        format!("Topic \"{topic}\" completed")
                    } else {
                        format!("Topic \"{topic}\" updated")
                    },
                });
                Dispatch::Invalidated(keys)
            }
            ServerMessage::ProgressUpdate {
                data: ProgressUpdate::Other,
                ..
            } => {
                tracing::debug!("ignoring progress_update with unhandled payload type");
                Dispatch::Ignored
            }
            ServerMessage::ProgressCreated { .. } => {
                let keys = vec![CacheKey::ProgressList];
                self.invalidate(&keys).await;
                self.notify(Notification {
                    kind: NotificationKind::ProgressCreated,
                    roadmap_id: None,
                    title: "Progress started".to_string(),
                    message: "A new progress record was initialized".to_string(),
                });
                Dispatch::Invalidated(keys)
            }
            ServerMessage::Unknown => {
                tracing::debug!("ignoring push message of unknown type");
                Dispatch::Ignored
            }
        }
    }

    /// Mark everything cached stale. Called when the channel comes back after a
    /// gap, since events sent while it was down are not replayed.
    pub async fn resync(&self) {
        match self.cache.invalidate_all().await {
            Ok(marked) => tracing::debug!(entries = marked, "cache marked stale after reconnect"),
            Err(err) => tracing::warn!(error = %err, "cache invalidation failed"),
        }
    }

    async fn invalidate(&self, keys: &[CacheKey]) {
        for key in keys {
            if let Err(err) = self.cache.invalidate(*key).await {
                tracing::warn!(key = %key, error = %err, "cache invalidation failed");
            }
        }
    }

    fn notify(&self, notification: Notification) {
        // No subscribers is fine; notices are transient.
        let _ = self.notifications.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadmap_core::model::{ProgressId, ProgressRecord, ProgressTree};
    use roadmap_core::time::fixed_now;
    use storage::repository::InMemoryProgressCache;

    fn record(roadmap: u64) -> ProgressRecord {
        ProgressRecord {
            id: ProgressId::new(roadmap),
            user_id: UserId::new(1),
            roadmap_id: RoadmapId::new(roadmap),
            progress: ProgressTree::default(),
            started_at: fixed_now(),
            last_accessed_at: fixed_now(),
        }
    }

    async fn seeded_cache() -> Arc<InMemoryProgressCache> {
        let cache = Arc::new(InMemoryProgressCache::new());
        cache
            .store_list(&[record(5), record(7)], fixed_now())
            .await
            .unwrap();
        for id in [5, 7] {
            cache
                .store_roadmap(RoadmapId::new(id), Some(&record(id)), fixed_now())
                .await
                .unwrap();
        }
        cache
    }

    #[tokio::test]
    async fn topic_progress_invalidates_list_and_that_roadmap_only() {
        let cache = seeded_cache().await;
        let handler = PushEventHandler::new(cache.clone(), 8);
        let mut notices = handler.subscribe();

        let dispatch = handler
            .handle_text(
                r#"{"type":"progress_update","data":{"type":"topic_progress","roadmapId":5,"action":"complete","topic":"DNS"}}"#,
            )
            .await;

        assert_eq!(
            dispatch,
            Dispatch::Invalidated(vec![
                CacheKey::ProgressList,
                CacheKey::Roadmap(RoadmapId::new(5))
            ])
        );
        assert!(cache.list().await.unwrap().unwrap().stale);
        assert!(cache.roadmap(RoadmapId::new(5)).await.unwrap().unwrap().stale);
        assert!(
            cache
                .roadmap(RoadmapId::new(7))
                .await
                .unwrap()
                .unwrap()
                .is_fresh()
        );

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.kind, NotificationKind::TopicCompleted);
        assert_eq!(notice.roadmap_id, Some(RoadmapId::new(5)));
        assert!(notice.message.contains("DNS"));
    }

    #[tokio::test]
    async fn other_actions_are_reported_as_updates() {
        let handler = PushEventHandler::new(seeded_cache().await, 8);
        let mut notices = handler.subscribe();
        handler
            .handle_text(
                r#"{"type":"progress_update","data":{"type":"topic_progress","roadmapId":7,"action":"incomplete","topic":"SQL"}}"#,
            )
            .await;
        assert_eq!(notices.recv().await.unwrap().kind, NotificationKind::TopicUpdated);
    }

    #[tokio::test]
    async fn progress_created_invalidates_list() {
        let cache = seeded_cache().await;
        let handler = PushEventHandler::new(cache.clone(), 8);
        let dispatch = handler
            .handle_text(r#"{"type":"progress_created","data":{"roadmapId":9}}"#)
            .await;
        assert_eq!(dispatch, Dispatch::Invalidated(vec![CacheKey::ProgressList]));
        assert!(cache.list().await.unwrap().unwrap().stale);
        assert!(
            cache
                .roadmap(RoadmapId::new(5))
                .await
                .unwrap()
                .unwrap()
                .is_fresh()
        );
    }

    #[tokio::test]
    async fn malformed_and_unknown_messages_touch_nothing() {
        let cache = seeded_cache().await;
        let handler = PushEventHandler::new(cache.clone(), 8);

        assert_eq!(handler.handle_text("{oops").await, Dispatch::Dropped);
        assert_eq!(
            handler.handle_text(r#"{"type":"pong"}"#).await,
            Dispatch::Ignored
        );
        assert_eq!(
            handler
                .handle_text(r#"{"type":"authenticated","data":{"userId":3}}"#)
                .await,
            Dispatch::Acknowledged(Some(UserId::new(3)))
        );
        assert_eq!(
            handler
                .handle_text(r#"{"type":"authenticated","data":{"status":"ok"}}"#)
                .await,
            Dispatch::Acknowledged(None)
        );
        assert!(cache.list().await.unwrap().unwrap().is_fresh());
    }

    #[tokio::test]
    async fn resync_marks_every_entry_stale() {
        let cache = seeded_cache().await;
        let handler = PushEventHandler::new(cache.clone(), 8);

        handler.resync().await;

        assert!(cache.list().await.unwrap().unwrap().stale);
        for id in [5, 7] {
            assert!(cache.roadmap(RoadmapId::new(id)).await.unwrap().unwrap().stale);
        }
    }

    #[tokio::test]
    async fn notifications_without_subscribers_are_fine() {
        let handler = PushEventHandler::new(seeded_cache().await, 1);
        let dispatch = handler
            .handle_text(r#"{"type":"progress_created","data":{}}"#)
            .await;
        assert!(matches!(dispatch, Dispatch::Invalidated(_)));
    }
}
