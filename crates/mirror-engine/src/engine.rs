//! One sync run: acquire cursor, paginate, map and persist, prune, commit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use content_source::{ContentSource, SyncRequest};
use mirror_sink::{MirrorStore, SyncState};
use mirror_types::ShapeRegistry;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::{persist_change, ItemMapper, MapperOptions, RunHooks, SyncStateHandle, SyncStats};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Page size for initial syncs
    pub limit: u32,
    /// Item type filter for initial syncs
    pub scope: String,
    pub mapper: MapperOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            scope: "all".to_string(),
            mapper: MapperOptions::default(),
        }
    }
}

/// Whether a run started from scratch or from a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    FullRefresh,
    Incremental,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identity stamped on every record the run wrote
    pub sync_id: String,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub stats: SyncStats,
    /// Ids of every item the run processed, in feed order
    pub touched_ids: Vec<String>,
    pub pruned: u64,
    /// Cursor committed for the next run
    pub cursor: String,
}

/// Drives runs of a content source into a store.
pub struct SyncEngine<S: MirrorStore, C: ContentSource> {
    store: Arc<S>,
    source: Arc<C>,
    mapper: ItemMapper,
    shapes: ShapeRegistry,
    hooks: RunHooks,
    limit: u32,
    scope: String,
}

impl<S: MirrorStore, C: ContentSource> SyncEngine<S, C> {
    pub fn new(store: Arc<S>, source: Arc<C>, options: EngineOptions) -> Self {
        Self {
            store,
            source,
            mapper: ItemMapper::new(options.mapper),
            shapes: ShapeRegistry::new(),
            hooks: RunHooks::new(),
            limit: options.limit,
            scope: options.scope,
        }
    }

    pub fn with_shapes(mut self, shapes: ShapeRegistry) -> Self {
        self.shapes = shapes;
        self
    }

    pub fn with_hooks(mut self, hooks: RunHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one sync.
    ///
    /// On failure nothing is committed: the next run resumes from the last
    /// committed cursor and sees the unfinished batch again.
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let state_handle = SyncStateHandle::new(self.store.as_ref());
        let mut state = state_handle.latest().await?;
        let last_cursor = state.cursor.clone();

        match self.run_chain(&state_handle, &mut state, started_at).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(
                    "Sync run started at {} failed (last committed cursor: {}): {:#}",
                    started_at,
                    last_cursor.as_deref().unwrap_or("none"),
                    e
                );
                Err(e)
            }
        }
    }

    async fn run_chain(
        &self,
        state_handle: &SyncStateHandle<'_, S>,
        state: &mut SyncState,
        started_at: DateTime<Utc>,
    ) -> Result<RunReport> {
        let timer = Instant::now();
        self.hooks
            .fire_before_run()
            .context("before_run hook failed")?;

        let (request, kind) = match &state.cursor {
            Some(cursor) => {
                match state.last_run_at {
                    Some(last) => info!(
                        "Starting update, last update: {} ({:.3}s ago)",
                        last,
                        (started_at - last).num_milliseconds() as f64 / 1000.0
                    ),
                    None => info!("Starting update"),
                }
                (SyncRequest::resume(cursor.clone()), RunKind::Incremental)
            }
            None => {
                info!("Starting full refresh");
                (
                    SyncRequest::initial(self.limit, self.scope.clone()),
                    RunKind::FullRefresh,
                )
            }
        };

        let mut pages = self
            .source
            .start(request)
            .await
            .context("Failed to start sync")?;

        let mut stats = SyncStats::new();
        let mut touched_ids = Vec::new();
        while let Some(page) = pages
            .next_page()
            .await
            .context("Failed to fetch sync page")?
        {
            for item in page.items {
                debug!("syncing: {}", item.id);
                let change = self.mapper.map(&item);
                persist_change(
                    self.store.as_ref(),
                    &self.shapes,
                    change,
                    &state.id,
                    &mut stats,
                )
                .await?;
                touched_ids.push(item.id);
            }
        }

        let cursor = pages
            .resumption_cursor()
            .ok_or_else(|| anyhow!("Sync finished without a resumption cursor"))?
            .to_string();

        let pruned = state_handle.drop_stale(state).await?;
        state_handle.commit(state, cursor.clone(), Utc::now()).await?;
        info!("Sync complete. {}", stats);

        self.hooks
            .fire_after_run(&touched_ids)
            .context("after_run hook failed")?;

        Ok(RunReport {
            sync_id: state.id.clone(),
            kind,
            started_at,
            duration: timer.elapsed(),
            stats,
            touched_ids,
            pruned,
            cursor,
        })
    }
}
