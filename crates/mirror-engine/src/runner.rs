//! Scheduler that drives the sync engine over time.
//!
//! - Poll mode: run, sleep `interval`, repeat.
//! - Webhook mode: run once, then wait for the pending-signal flag set by the
//!   webhook ingress. A signal triggers a run once `debounce_window` has
//!   passed since the previous attempt started; signals arriving during that
//!   wait are folded into the same run.
//!
//! Every run happens under the [`RunLock`]. Cancelling the shutdown token lets
//! an in-flight run finish and prevents the next one from starting.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use content_source::ContentSource;
use mirror_sink::MirrorStore;
use serde::Deserialize;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{RunLock, RunReport, SyncEngine};

/// Scheduling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Poll,
    Webhook,
}

impl FromStr for SyncMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" => Ok(Self::Poll),
            "webhook" => Ok(Self::Webhook),
            other => anyhow::bail!("Unknown sync mode: {other:?} (expected poll or webhook)"),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poll => f.write_str("poll"),
            Self::Webhook => f.write_str("webhook"),
        }
    }
}

/// Scheduler timing.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub mode: SyncMode,
    /// Sleep between runs in poll mode
    pub interval: Duration,
    /// Sleep between signal checks in webhook mode
    pub check_interval: Duration,
    /// Minimum time between the starts of signal-triggered runs
    pub debounce_window: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Poll,
            interval: Duration::from_secs(15),
            check_interval: Duration::from_secs(1),
            debounce_window: Duration::from_secs(10),
        }
    }
}

/// Counters of a scheduler lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSummary {
    pub completed: u64,
    pub failed: u64,
    /// Runs skipped because another run held the lock
    pub skipped: u64,
}

enum Attempt {
    Completed,
    Failed,
    Skipped,
}

pub struct SyncRunner<S: MirrorStore, C: ContentSource> {
    engine: SyncEngine<S, C>,
    lock: RunLock<S>,
    config: RunnerConfig,
    last_attempt: Option<Instant>,
    summary: RunnerSummary,
}

impl<S: MirrorStore, C: ContentSource> SyncRunner<S, C> {
    pub fn new(engine: SyncEngine<S, C>, lock: RunLock<S>, config: RunnerConfig) -> Self {
        Self {
            engine,
            lock,
            config,
            last_attempt: None,
            summary: RunnerSummary::default(),
        }
    }

    pub fn summary(&self) -> RunnerSummary {
        self.summary
    }

    /// Perform a single run under the lock.
    ///
    /// Returns `Ok(None)` when another run holds the lock.
    pub async fn run_once(&mut self) -> Result<Option<RunReport>> {
        let Some(guard) = self.lock.try_acquire().await? else {
            return Ok(None);
        };
        let result = self.engine.run().await;
        if let Err(e) = guard.release().await {
            warn!("Failed to release run lock: {:#}", e);
        }
        result.map(Some)
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) -> RunnerSummary {
        info!("Starting sync runner in {} mode", self.config.mode);
        match self.config.mode {
            SyncMode::Poll => self.poll_loop(&shutdown).await,
            SyncMode::Webhook => self.webhook_loop(&shutdown).await,
        }
        info!(
            "Sync runner stopped ({} completed, {} failed, {} skipped)",
            self.summary.completed, self.summary.failed, self.summary.skipped
        );
        self.summary
    }

    async fn poll_loop(&mut self, shutdown: &CancellationToken) {
        while !shutdown.is_cancelled() {
            self.attempt().await;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.config.interval) => {}
            }
        }
    }

    async fn webhook_loop(&mut self, shutdown: &CancellationToken) {
        if shutdown.is_cancelled() {
            return;
        }
        self.attempt_rearming().await;

        while !shutdown.is_cancelled() {
            let signalled = match self.engine.store().consume_webhook_signal().await {
                Ok(signalled) => signalled,
                Err(e) => {
                    error!("Failed to check webhook signal: {:#}", e);
                    false
                }
            };

            if !signalled {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(self.config.check_interval) => {}
                }
                continue;
            }

            debug!("Webhook signal received");
            if let Some(deadline) = self.debounce_deadline() {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        // Leave the consumed signal for the next process
                        self.rearm_signal().await;
                        break;
                    }
                    _ = sleep_until(deadline) => {}
                }
                // Signals that arrived during the wait are covered by this run
                match self.engine.store().consume_webhook_signal().await {
                    Ok(true) => debug!("Coalesced webhook signals received during debounce window"),
                    Ok(false) => {}
                    Err(e) => warn!("Failed to clear coalesced webhook signal: {:#}", e),
                }
            }

            self.attempt_rearming().await;
        }
    }

    /// When the previous attempt started less than a debounce window ago,
    /// the instant the next one may start.
    fn debounce_deadline(&self) -> Option<Instant> {
        let deadline = self.last_attempt? + self.config.debounce_window;
        (deadline > Instant::now()).then_some(deadline)
    }

    /// Attempt a run; if it was skipped for contention or failed, re-arm the
    /// signal so the change is retried after the debounce window.
    async fn attempt_rearming(&mut self) {
        match self.attempt().await {
            Attempt::Completed => {}
            Attempt::Skipped | Attempt::Failed => self.rearm_signal().await,
        }
    }

    async fn rearm_signal(&self) {
        if let Err(e) = self.engine.store().signal_webhook().await {
            error!("Failed to re-arm webhook signal: {:#}", e);
        }
    }

    async fn attempt(&mut self) -> Attempt {
        self.last_attempt = Some(Instant::now());

        match self.run_once().await {
            Ok(Some(report)) => {
                self.summary.completed += 1;
                info!(
                    "Run finished in {:.3}s ({} items, {} pruned)",
                    report.duration.as_secs_f64(),
                    report.touched_ids.len(),
                    report.pruned
                );
                Attempt::Completed
            }
            Ok(None) => {
                self.summary.skipped += 1;
                info!("Another sync run holds the lock, skipping");
                Attempt::Skipped
            }
            Err(e) => {
                // The engine logged the failure with its context
                self.summary.failed += 1;
                debug!("Run failed: {:#}", e);
                Attempt::Failed
            }
        }
    }
}
