//! Sync engine runs against the scripted source and the in-memory store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use content_source::testing::{ScriptedRun, ScriptedSource};
use content_source::SyncRequest;
use mirror_engine::{EngineOptions, MapperOptions, RunHooks, RunKind, SyncEngine};
use mirror_sink::{MemoryStore, MirrorStore, SyncState};
use mirror_types::{ItemType, MirroredRecord, RemoteItem, RemoteValue};
use serde_json::json;

fn page(title: &str, id: &str) -> RemoteItem {
    RemoteItem::entry(id, "page").with_field("title", "en-NZ", RemoteValue::scalar(title))
}

fn engine(store: &Arc<MemoryStore>, source: &Arc<ScriptedSource>) -> SyncEngine<MemoryStore, ScriptedSource> {
    SyncEngine::new(store.clone(), source.clone(), EngineOptions::default())
}

#[tokio::test]
async fn test_full_refresh_then_resume_from_cursor() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(
        ScriptedSource::new()
            .with_run(
                ScriptedRun::new("next123")
                    .page(vec![page("Home", "A"), page("About", "B")])
                    .page(vec![RemoteItem::asset("IMG")]),
            )
            .with_run(ScriptedRun::new("next456").page(vec![page("Home v2", "A")])),
    );
    let engine = engine(&store, &source);

    let first = engine.run().await.unwrap();
    assert_eq!(first.kind, RunKind::FullRefresh);
    assert_eq!(first.stats.added, 3);
    assert_eq!(first.touched_ids, vec!["A", "B", "IMG"]);
    assert_eq!(
        store.load_state().await.unwrap().unwrap().cursor.as_deref(),
        Some("next123")
    );

    let second = engine.run().await.unwrap();
    assert_eq!(second.kind, RunKind::Incremental);
    assert_eq!(second.stats.updated, 1);
    assert_eq!(second.sync_id, first.sync_id);
    assert_eq!(second.pruned, 0);

    assert_eq!(
        source.requests(),
        vec![
            SyncRequest::initial(100, "all"),
            SyncRequest::resume("next123"),
        ]
    );

    let home = store.find_record("A").await.unwrap().unwrap();
    assert_eq!(home.field("title"), Some(&json!("Home v2")));
    assert_eq!(store.record_count().await, 3);
}

#[tokio::test]
async fn test_stale_records_are_pruned() {
    let store = Arc::new(MemoryStore::new());
    for record in [
        MirroredRecord::new("A", "page").with_sync_id("run1"),
        MirroredRecord::new("B", "page").with_sync_id("run1"),
        MirroredRecord::new("C", "page"),
    ] {
        store.upsert_record(&record).await.unwrap();
    }
    store.save_state(&SyncState::with_id("run2")).await.unwrap();

    let source = Arc::new(
        ScriptedSource::new().with_run(ScriptedRun::new("c1").page(vec![page("A", "A")])),
    );
    let report = engine(&store, &source).run().await.unwrap();

    assert_eq!(report.pruned, 1);
    let ids: Vec<String> = store.records().await.into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["A", "C"]);
    assert_eq!(
        store.find_record("A").await.unwrap().unwrap().sync_id.as_deref(),
        Some("run2")
    );
}

#[tokio::test]
async fn test_fetch_failure_does_not_commit_cursor() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(
        ScriptedSource::new()
            .with_run(ScriptedRun::new("c1").page(vec![page("A", "A")]))
            .with_run(
                ScriptedRun::new("c2")
                    .page(vec![page("B", "B")])
                    .fail_at_page(1),
            ),
    );
    let engine = engine(&store, &source);

    engine.run().await.unwrap();
    assert!(engine.run().await.is_err());

    let state = store.load_state().await.unwrap().unwrap();
    assert_eq!(state.cursor.as_deref(), Some("c1"));
    // Items written before the failure stay; the next run sees them again
    assert!(store.find_record("B").await.unwrap().is_some());

    engine.run().await.unwrap();
    assert_eq!(source.requests()[2], SyncRequest::resume("c1"));
}

/// Memory store whose upserts of one record id fail.
struct FailingStore {
    inner: MemoryStore,
    fail_id: String,
}

#[async_trait]
impl MirrorStore for FailingStore {
    async fn find_record(&self, id: &str) -> anyhow::Result<Option<MirroredRecord>> {
        self.inner.find_record(id).await
    }

    async fn upsert_record(&self, record: &MirroredRecord) -> anyhow::Result<()> {
        if record.id == self.fail_id {
            anyhow::bail!("write rejected for {}", record.id);
        }
        self.inner.upsert_record(record).await
    }

    async fn delete_record(&self, id: &str) -> anyhow::Result<bool> {
        self.inner.delete_record(id).await
    }

    async fn delete_stale(&self, sync_id: &str) -> anyhow::Result<u64> {
        self.inner.delete_stale(sync_id).await
    }

    async fn delete_all_records(&self) -> anyhow::Result<u64> {
        self.inner.delete_all_records().await
    }

    async fn load_state(&self) -> anyhow::Result<Option<SyncState>> {
        self.inner.load_state().await
    }

    async fn save_state(&self, state: &SyncState) -> anyhow::Result<()> {
        self.inner.save_state(state).await
    }

    async fn clear_state(&self) -> anyhow::Result<()> {
        self.inner.clear_state().await
    }

    async fn signal_webhook(&self) -> anyhow::Result<()> {
        self.inner.signal_webhook().await
    }

    async fn consume_webhook_signal(&self) -> anyhow::Result<bool> {
        self.inner.consume_webhook_signal().await
    }

    async fn acquire_lease(&self, name: &str, owner: &str, ttl: Duration) -> anyhow::Result<bool> {
        self.inner.acquire_lease(name, owner, ttl).await
    }

    async fn release_lease(&self, name: &str, owner: &str) -> anyhow::Result<()> {
        self.inner.release_lease(name, owner).await
    }
}

#[tokio::test]
async fn test_store_write_failure_aborts_run_without_commit() {
    let store = Arc::new(FailingStore {
        inner: MemoryStore::new(),
        fail_id: "C".to_string(),
    });
    let source = Arc::new(
        ScriptedSource::new()
            .with_run(ScriptedRun::new("c1").page(vec![page("A", "A")]))
            .with_run(ScriptedRun::new("c2").page(vec![
                page("B", "B"),
                page("C", "C"),
                page("D", "D"),
            ])),
    );
    let engine = SyncEngine::new(store.clone(), source.clone(), EngineOptions::default());

    engine.run().await.unwrap();
    assert!(engine.run().await.is_err());

    assert!(store.find_record("B").await.unwrap().is_some());
    assert!(store.find_record("C").await.unwrap().is_none());
    assert!(store.find_record("D").await.unwrap().is_none());
    let state = store.load_state().await.unwrap().unwrap();
    assert_eq!(state.cursor.as_deref(), Some("c1"));
}

#[tokio::test]
async fn test_deletions_and_unknown_items_are_touched() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(
        ScriptedSource::new()
            .with_run(ScriptedRun::new("c1").page(vec![page("A", "A"), page("B", "B")]))
            .with_run(ScriptedRun::new("c2").page(vec![
                RemoteItem::new("B", ItemType::DeletedEntry),
                RemoteItem::new("GONE", ItemType::DeletedAsset),
                RemoteItem::new("X", ItemType::Other("Locale".to_string())),
            ])),
    );
    let engine = engine(&store, &source);
    engine.run().await.unwrap();

    let report = engine.run().await.unwrap();
    assert_eq!(report.touched_ids, vec!["B", "GONE", "X"]);
    assert_eq!(report.stats.deleted, 1);
    assert_eq!(report.stats.total(), 1);
    assert_eq!(store.record_count().await, 1);
}

#[tokio::test]
async fn test_tag_filter_removes_untagged_records() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(
        ScriptedSource::new()
            .with_run(ScriptedRun::new("c1").page(vec![page("A", "A").with_tags(["public"])]))
            .with_run(ScriptedRun::new("c2").page(vec![page("A", "A").with_tags(["draft"])])),
    );
    let options = EngineOptions {
        mapper: MapperOptions {
            content_tags: vec!["public".to_string()],
            ..Default::default()
        },
        ..Default::default()
    };
    let engine = SyncEngine::new(store.clone(), source.clone(), options);

    engine.run().await.unwrap();
    assert_eq!(store.record_count().await, 1);

    let report = engine.run().await.unwrap();
    assert_eq!(report.stats.deleted, 1);
    assert_eq!(store.record_count().await, 0);
}

#[tokio::test]
async fn test_hooks_fire_around_the_run() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(
        ScriptedSource::new().with_run(ScriptedRun::new("c1").page(vec![
            page("A", "A"),
            RemoteItem::new("D1", ItemType::DeletedEntry),
        ])),
    );
    let events = Arc::new(Mutex::new(Vec::new()));
    let (before, after) = (events.clone(), events.clone());
    let hooks = RunHooks::new()
        .before_run(move || {
            before.lock().unwrap().push("before".to_string());
            Ok(())
        })
        .after_run(move |ids| {
            after.lock().unwrap().push(format!("after:{}", ids.join(",")));
            Ok(())
        });

    engine(&store, &source).with_hooks(hooks).run().await.unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["before", "after:A,D1"]);
}

#[tokio::test]
async fn test_failing_before_hook_aborts_run() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::new());
    let hooks = RunHooks::new().before_run(|| anyhow::bail!("search index offline"));

    let result = engine(&store, &source).with_hooks(hooks).run().await;

    assert!(result.is_err());
    assert_eq!(source.start_count(), 0);
    assert!(store
        .load_state()
        .await
        .unwrap()
        .unwrap()
        .needs_full_refresh());
}

#[tokio::test]
async fn test_fresh_chain_prunes_previous_records_on_next_sweep() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(
        ScriptedSource::new()
            .with_run(ScriptedRun::new("c1").page(vec![page("A", "A"), page("B", "B")]))
            .with_run(ScriptedRun::new("c2").page(vec![page("A", "A")])),
    );
    let engine = engine(&store, &source);
    let first = engine.run().await.unwrap();

    mirror_engine::SyncStateHandle::new(store.as_ref())
        .fresh(false)
        .await
        .unwrap();

    let second = engine.run().await.unwrap();
    assert_eq!(second.kind, RunKind::FullRefresh);
    assert_ne!(second.sync_id, first.sync_id);
    assert_eq!(second.pruned, 1);
    assert_eq!(source.requests()[1], SyncRequest::initial(100, "all"));
    assert!(store.find_record("B").await.unwrap().is_none());
}
