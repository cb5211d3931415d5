use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;

use roadmap_core::model::{
    Node, NodeId, ProgressId, ProgressRecord, ProgressTree, Roadmap, RoadmapId, Section, UserId,
};
use roadmap_core::state::{NodeAction, NodeState};
use roadmap_core::time::fixed_now;
use services::api::{ProgressApi, UpsertProgress};
use services::{ApiError, Clock, ProgressMutator, ProgressQueries, ToggleError};
use chrono::{DateTime, Utc};
use storage::repository::{
    CacheEntry, CacheKey, InMemoryProgressCache, ProgressCache, Storage, StorageError,
};

const ROADMAP: RoadmapId = RoadmapId::new(5);
const USER: UserId = UserId::new(1);

#[derive(Default)]
struct FakeApi {
    roadmap: Option<Roadmap>,
    records: Mutex<Vec<ProgressRecord>>,
    calls: Mutex<Vec<String>>,
    fail_node: AtomicBool,
    fail_upsert: AtomicBool,
}

impl FakeApi {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ProgressApi for FakeApi {
    async fn set_node_progress(
        &self,
        roadmap_id: RoadmapId,
        node: &NodeId,
        action: NodeAction,
    ) -> Result<serde_json::Value, ApiError> {
        self.log(format!("node:{roadmap_id}:{node}:{action}"));
        if self.fail_node.load(Ordering::SeqCst) {
            return Err(ApiError::HttpStatus(StatusCode::INTERNAL_SERVER_ERROR));
        }
        Ok(serde_json::json!({ "ok": true }))
    }

    async fn upsert_progress(&self, body: &UpsertProgress) -> Result<ProgressRecord, ApiError> {
        self.log("upsert".to_string());
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(ApiError::HttpStatus(StatusCode::BAD_GATEWAY));
        }
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records
            .iter_mut()
            .find(|r| r.roadmap_id == body.roadmap_id && r.user_id == body.user_id)
        {
            record.progress = body.progress.clone();
            return Ok(record.clone());
        }
        let record = ProgressRecord {
            id: ProgressId::new(100 + records.len() as u64),
            user_id: body.user_id,
            roadmap_id: body.roadmap_id,
            progress: body.progress.clone(),
            started_at: fixed_now(),
            last_accessed_at: fixed_now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn list_progress(
        &self,
        roadmap_id: Option<RoadmapId>,
    ) -> Result<Vec<ProgressRecord>, ApiError> {
        self.log("list".to_string());
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| roadmap_id.is_none_or(|id| r.roadmap_id == id))
            .cloned()
            .collect())
    }

    async fn fetch_roadmap(&self, roadmap_id: RoadmapId) -> Result<Roadmap, ApiError> {
        self.log("roadmap".to_string());
        self.roadmap
            .clone()
            .filter(|r| r.id == roadmap_id)
            .ok_or(ApiError::HttpStatus(StatusCode::NOT_FOUND))
    }
}

fn id(raw: &str) -> NodeId {
    NodeId::new(raw).unwrap()
}

fn roadmap() -> Roadmap {
    Roadmap {
        id: ROADMAP,
        title: "Backend".to_string(),
        sections: vec![
            Section::new(
                "Internet",
                vec![
                    Node::new(id("dns"), "How DNS works"),
                    Node::new(id("http"), "HTTP"),
                    Node::new(id("tls"), "TLS"),
                ],
            ),
            Section::new("Databases", vec![Node::new(id("sql"), "SQL")]),
        ],
    }
}

fn existing_record() -> ProgressRecord {
    ProgressRecord {
        id: ProgressId::new(9),
        user_id: USER,
        roadmap_id: ROADMAP,
        progress: ProgressTree::from_roadmap(&roadmap()),
        started_at: fixed_now(),
        last_accessed_at: fixed_now(),
    }
}

fn setup(api: FakeApi) -> (Arc<FakeApi>, Arc<InMemoryProgressCache>, ProgressMutator) {
    let api = Arc::new(api);
    let cache = Arc::new(InMemoryProgressCache::new());
    let mutator = ProgressMutator::new(
        Clock::fixed(fixed_now()),
        USER,
        api.clone(),
        cache.clone(),
    );
    (api, cache, mutator)
}

#[tokio::test]
async fn three_clicks_cycle_state_and_percentage() {
    let (api, _cache, mutator) = setup(FakeApi {
        roadmap: Some(roadmap()),
        ..FakeApi::default()
    });
    let dns = id("dns");

    let first = mutator.toggle_node(ROADMAP, 0, &dns).await.unwrap();
    assert!(first.created);
    assert_eq!(first.transition.to, NodeState::InProgress);
    assert_eq!(first.section.percentage, 0);

    let second = mutator.toggle_node(ROADMAP, 0, &dns).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.transition.to, NodeState::Completed);
    assert_eq!(second.section.percentage, 33);

    let third = mutator.toggle_node(ROADMAP, 0, &dns).await.unwrap();
    assert_eq!(third.transition.to, NodeState::InProgress);
    assert_eq!(third.section.percentage, 0);

    assert_eq!(
        api.calls(),
        vec![
            "list",
            "roadmap",
            "node:5:dns:incomplete",
            "upsert",
            "node:5:dns:complete",
            "upsert",
            "node:5:dns:incomplete",
            "upsert",
        ]
    );
}

#[tokio::test]
async fn first_toggle_builds_tree_from_roadmap_definition() {
    let (api, _cache, mutator) = setup(FakeApi {
        roadmap: Some(roadmap()),
        ..FakeApi::default()
    });

    let outcome = mutator.toggle_node(ROADMAP, 1, &id("sql")).await.unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.record.user_id, USER);
    let sections = outcome.record.progress.sections();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].nodes().len(), 3);
    assert!(sections[0].nodes().iter().all(|n| n.state() == NodeState::NotStarted));
    assert_eq!(
        outcome.record.progress.node_state(1, &id("sql")).unwrap(),
        NodeState::InProgress
    );
    assert_eq!(api.records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn node_write_failure_skips_tree_upsert() {
    let api = FakeApi {
        records: Mutex::new(vec![existing_record()]),
        ..FakeApi::default()
    };
    api.fail_node.store(true, Ordering::SeqCst);
    let (api, cache, mutator) = setup(api);

    let err = mutator.toggle_node(ROADMAP, 0, &id("http")).await.unwrap_err();

    assert!(matches!(err, ToggleError::NodeWrite(_)));
    assert!(!api.calls().contains(&"upsert".to_string()));
    // Optimistic local state is kept.
    let entry = cache.roadmap(ROADMAP).await.unwrap().unwrap();
    let record = entry.value.unwrap();
    assert_eq!(
        record.progress.node_state(0, &id("http")).unwrap(),
        NodeState::InProgress
    );
}

#[tokio::test]
async fn tree_upsert_failure_is_reported_as_partial_write() {
    let api = FakeApi {
        records: Mutex::new(vec![existing_record()]),
        ..FakeApi::default()
    };
    api.fail_upsert.store(true, Ordering::SeqCst);
    let (api, cache, mutator) = setup(api);

    let err = mutator.toggle_node(ROADMAP, 0, &id("tls")).await.unwrap_err();

    match err {
        ToggleError::PartialWrite {
            roadmap_id, node, ..
        } => {
            assert_eq!(roadmap_id, ROADMAP);
            assert_eq!(node, id("tls"));
        }
        other => panic!("expected partial write, got {other:?}"),
    }
    assert!(cache.roadmap(ROADMAP).await.unwrap().unwrap().stale);

    // The next read goes back to the server.
    api.fail_upsert.store(false, Ordering::SeqCst);
    let queries = ProgressQueries::new(Clock::fixed(fixed_now()), api.clone(), cache.clone());
    let before = api.calls().len();
    let record = queries.for_roadmap(ROADMAP).await.unwrap().unwrap();
    assert_eq!(api.calls()[before..], ["list".to_string()]);
    assert_eq!(
        record.progress.node_state(0, &id("tls")).unwrap(),
        NodeState::NotStarted
    );
}

#[tokio::test]
async fn unknown_node_sends_nothing() {
    let (api, _cache, mutator) = setup(FakeApi {
        records: Mutex::new(vec![existing_record()]),
        ..FakeApi::default()
    });

    let err = mutator.toggle_node(ROADMAP, 0, &id("grpc")).await.unwrap_err();
    assert!(matches!(err, ToggleError::Model(_)));
    let err = mutator.toggle_node(ROADMAP, 7, &id("dns")).await.unwrap_err();
    assert!(matches!(err, ToggleError::Model(_)));

    assert_eq!(api.calls(), vec!["list"]);
}

#[tokio::test]
async fn missing_roadmap_definition_fails_before_any_write() {
    let (api, _cache, mutator) = setup(FakeApi::default());

    let err = mutator.toggle_node(ROADMAP, 0, &id("dns")).await.unwrap_err();

    assert!(matches!(err, ToggleError::Roadmap(_)));
    assert_eq!(api.calls(), vec!["list", "roadmap"]);
}

#[tokio::test]
async fn successful_toggle_refreshes_list_on_next_read() {
    let (api, cache, mutator) = setup(FakeApi {
        records: Mutex::new(vec![existing_record()]),
        ..FakeApi::default()
    });
    let queries = ProgressQueries::new(Clock::fixed(fixed_now()), api.clone(), cache.clone());
    assert_eq!(queries.list().await.unwrap().len(), 1);

    mutator.toggle_node(ROADMAP, 0, &id("dns")).await.unwrap();
    let overview = queries.overview(ROADMAP).await.unwrap().unwrap();
    assert_eq!(overview.current_section, Some(0));

    let records = queries.list().await.unwrap();
    assert_eq!(
        records[0].progress.node_state(0, &id("dns")).unwrap(),
        NodeState::InProgress
    );
    assert_eq!(
        api.calls(),
        vec!["list", "list", "node:5:dns:incomplete", "upsert", "list"]
    );
}

#[tokio::test]
async fn reopened_sqlite_cache_refetches_before_toggling() {
    let url = "sqlite:file:toggle_reopen?mode=memory&cache=shared";
    let api = Arc::new(FakeApi {
        records: Mutex::new(vec![existing_record()]),
        ..FakeApi::default()
    });
    let first = Storage::sqlite(url, Some(USER)).await.unwrap();
    let queries = ProgressQueries::new(Clock::fixed(fixed_now()), api.clone(), first.progress.clone());
    queries.for_roadmap(ROADMAP).await.unwrap();

    // Another session completes `dns` while this process is down.
    {
        let mut records = api.records.lock().unwrap();
        records[0].progress = records[0]
            .progress
            .with_node_state(0, &id("dns"), NodeState::Completed)
            .unwrap();
    }

    let second = Storage::sqlite(url, Some(USER)).await.unwrap();
    assert!(second.progress.roadmap(ROADMAP).await.unwrap().unwrap().stale);

    let mutator = ProgressMutator::new(
        Clock::fixed(fixed_now()),
        USER,
        api.clone(),
        second.progress.clone(),
    );
    mutator.toggle_node(ROADMAP, 0, &id("http")).await.unwrap();

    let stored = api.records.lock().unwrap()[0].progress.clone();
    assert_eq!(stored.node_state(0, &id("dns")).unwrap(), NodeState::Completed);
    assert_eq!(stored.node_state(0, &id("http")).unwrap(), NodeState::InProgress);
    drop(first);
}

#[tokio::test]
async fn sqlite_cache_entries_are_per_user() {
    let url = "sqlite:file:toggle_per_user?mode=memory&cache=shared";
    let mine = Storage::sqlite(url, Some(USER)).await.unwrap();
    mine.progress
        .store_roadmap(ROADMAP, Some(&existing_record()), fixed_now())
        .await
        .unwrap();

    let theirs = Storage::sqlite(url, Some(UserId::new(2))).await.unwrap();
    assert!(theirs.progress.roadmap(ROADMAP).await.unwrap().is_none());
    assert!(theirs.progress.list().await.unwrap().is_none());
    assert!(mine.progress.roadmap(ROADMAP).await.unwrap().is_some());
}

/// Cache whose per-roadmap invalidation always fails.
struct StuckRoadmapCache(InMemoryProgressCache);

#[async_trait]
impl ProgressCache for StuckRoadmapCache {
    async fn list(&self) -> Result<Option<CacheEntry<Vec<ProgressRecord>>>, StorageError> {
        self.0.list().await
    }

    async fn store_list(
        &self,
        records: &[ProgressRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.0.store_list(records, fetched_at).await
    }

    async fn roadmap(
        &self,
        id: RoadmapId,
    ) -> Result<Option<CacheEntry<Option<ProgressRecord>>>, StorageError> {
        self.0.roadmap(id).await
    }

    async fn store_roadmap(
        &self,
        id: RoadmapId,
        record: Option<&ProgressRecord>,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.0.store_roadmap(id, record, fetched_at).await
    }

    async fn invalidate(&self, key: CacheKey) -> Result<bool, StorageError> {
        match key {
            CacheKey::Roadmap(_) => Err(StorageError::Connection("disk full".to_string())),
            CacheKey::ProgressList => self.0.invalidate(key).await,
        }
    }

    async fn invalidate_all(&self) -> Result<u64, StorageError> {
        self.0.invalidate_all().await
    }
}

#[tokio::test]
async fn partial_write_is_reported_even_if_invalidation_fails() {
    let api = FakeApi {
        records: Mutex::new(vec![existing_record()]),
        ..FakeApi::default()
    };
    api.fail_upsert.store(true, Ordering::SeqCst);
    let api = Arc::new(api);
    let cache = Arc::new(StuckRoadmapCache(InMemoryProgressCache::new()));
    cache.store_list(&[existing_record()], fixed_now()).await.unwrap();
    let mutator = ProgressMutator::new(Clock::fixed(fixed_now()), USER, api, cache.clone());

    let err = mutator.toggle_node(ROADMAP, 0, &id("dns")).await.unwrap_err();

    assert!(matches!(err, ToggleError::PartialWrite { .. }));
    assert!(cache.list().await.unwrap().unwrap().stale);
}
