//! Command implementations shared by the binary and the integration tests.
//!
//! Everything here is generic over the store and the content source; the
//! binary branches once on the configured store backend and calls in.

use std::sync::Arc;

use anyhow::{Context, Result};
use content_source::{ContentSource, DeliveryClient};
use mirror_engine::{
    RunLock, RunReport, RunnerSummary, SyncEngine, SyncRunner, SyncStateHandle,
};
use mirror_sink::{MirrorStore, SyncState};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::webhook::{self, WebhookSettings};

/// Build the HTTP client for the configured space.
pub fn delivery_client(config: &Config) -> Result<DeliveryClient> {
    DeliveryClient::builder()
        .api_url(&config.source.api_url)
        .space(&config.source.space)
        .environment(&config.source.environment)
        .access_token(&config.source.access_token)
        .timeout(config.source.timeout)
        .build()
        .context("Failed to create content source client")
}

fn build_runner<S, C>(config: &Config, store: Arc<S>, source: Arc<C>) -> Result<SyncRunner<S, C>>
where
    S: MirrorStore + 'static,
    C: ContentSource + 'static,
{
    let engine = SyncEngine::new(store.clone(), source, config.engine_options())
        .with_shapes(config.shapes()?);
    let lock = RunLock::from_backend(config.lock.backend, store, config.lock.ttl);
    Ok(SyncRunner::new(engine, lock, config.runner_config()))
}

/// Run the scheduler, and the webhook listener when enabled, until
/// `shutdown` is cancelled.
pub async fn run_scheduler<S, C>(
    config: &Config,
    store: Arc<S>,
    source: Arc<C>,
    shutdown: CancellationToken,
) -> Result<RunnerSummary>
where
    S: MirrorStore + 'static,
    C: ContentSource + 'static,
{
    let mut runner = build_runner(config, store.clone(), source)?;

    let listener = if config.webhook.enabled {
        let listener = TcpListener::bind(config.webhook.listen)
            .await
            .with_context(|| format!("Failed to bind webhook listener to {}", config.webhook.listen))?;
        let router = webhook::router(
            store,
            &config.webhook.path,
            WebhookSettings::from_config(&config.webhook, config.runner.mode),
        );
        let server_shutdown = shutdown.child_token();
        Some(tokio::spawn(webhook::serve(listener, router, server_shutdown)))
    } else {
        None
    };

    let summary = runner.run(shutdown).await;

    if let Some(handle) = listener {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("{:#}", e),
            Err(e) => error!("Webhook listener task failed: {}", e),
        }
    }
    Ok(summary)
}

/// Perform exactly one run. `None` when another run holds the lock.
pub async fn sync_once<S, C>(config: &Config, store: Arc<S>, source: Arc<C>) -> Result<Option<RunReport>>
where
    S: MirrorStore + 'static,
    C: ContentSource + 'static,
{
    build_runner(config, store, source)?.run_once().await
}

/// Reset the sync state, optionally deleting every mirrored record.
pub async fn fresh<S: MirrorStore + ?Sized>(store: &S, purge: bool) -> Result<SyncState> {
    let state = SyncStateHandle::new(store).fresh(purge).await?;
    info!("Reset sync state, next run performs a full refresh");
    Ok(state)
}

/// Human-readable summary of the stored sync state.
pub fn describe_state(state: Option<&SyncState>) -> String {
    let Some(state) = state else {
        return "No sync has run yet".to_string();
    };

    let mut lines = vec![format!("Sync chain: {}", state.id)];
    match (&state.cursor, state.last_run_at) {
        (Some(_), Some(last_run_at)) => lines.push(format!("Last run:   {}", last_run_at.to_rfc3339())),
        (Some(_), None) => lines.push("Last run:   unknown".to_string()),
        (None, _) => lines.push("Last run:   never (next run is a full refresh)".to_string()),
    }
    if state.webhook_pending {
        lines.push("Webhook:    signal pending".to_string());
    }
    lines.join("\n")
}

/// One-line summary of a completed run.
pub fn describe_report(report: &RunReport) -> String {
    format!(
        "{:?} run finished in {:.3}s: {}, pruned: {}",
        report.kind,
        report.duration.as_secs_f64(),
        report.stats,
        report.pruned
    )
}
