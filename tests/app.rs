//! Commands run against the in-memory store and a scripted source.

use std::sync::Arc;
use std::time::Duration;

use content_mirror::app;
use content_mirror::config::Config;
use content_source::testing::{ScriptedRun, ScriptedSource};
use content_source::SyncRequest;
use mirror_engine::{LockBackend, RunKind, SyncMode};
use mirror_sink::{MemoryStore, MirrorStore};
use mirror_types::{RemoteItem, RemoteValue};
use tokio_util::sync::CancellationToken;

fn config() -> Config {
    let mut config = Config::default();
    config.source.space = "space1".to_string();
    config.source.access_token = "token1".to_string();
    config.lock.backend = LockBackend::InProcess;
    config
}

fn page(id: &str, title: &str) -> RemoteItem {
    RemoteItem::entry(id, "page").with_field("title", "en-NZ", RemoteValue::scalar(title))
}

#[tokio::test]
async fn test_sync_once_then_fresh() {
    let config = config();
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(
        ScriptedSource::new()
            .with_run(ScriptedRun::new("c1").page(vec![page("A", "Home"), page("B", "About")]))
            .with_run(ScriptedRun::new("c2").page(vec![page("A", "Home v2")])),
    );

    let report = app::sync_once(&config, store.clone(), source.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.kind, RunKind::FullRefresh);
    assert_eq!(report.stats.added, 2);
    assert!(app::describe_report(&report).contains("added: 2"));

    let state = store.load_state().await.unwrap();
    assert!(app::describe_state(state.as_ref()).contains(&report.sync_id));

    let report = app::sync_once(&config, store.clone(), source.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.kind, RunKind::Incremental);
    assert_eq!(report.stats.updated, 1);
    assert_eq!(store.record_count().await, 2);

    let state = app::fresh(store.as_ref(), true).await.unwrap();
    assert!(state.cursor.is_none());
    assert_eq!(store.record_count().await, 0);

    assert_eq!(
        source.requests(),
        vec![SyncRequest::initial(100, "all"), SyncRequest::resume("c1")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_stops_on_shutdown() {
    let mut config = config();
    config.runner.mode = SyncMode::Poll;
    config.runner.interval = Duration::from_secs(10);

    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::new().with_run(ScriptedRun::new("c1").page(vec![page("A", "Home")])));
    let shutdown = CancellationToken::new();

    let handle = {
        let store = store.clone();
        let source = source.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { app::run_scheduler(&config, store, source, shutdown).await })
    };

    tokio::time::sleep(Duration::from_secs(25)).await;
    shutdown.cancel();
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(summary.completed, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(store.record_count().await, 1);
}
