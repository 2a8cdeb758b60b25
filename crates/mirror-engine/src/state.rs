//! Explicit handle over the singleton sync state.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mirror_sink::{MirrorStore, SyncState};
use tracing::info;

/// Access to the sync state held by a store.
///
/// There is no process-wide instance: callers create a handle over the store
/// they were given. The store keeps at most one state record.
pub struct SyncStateHandle<'a, S: MirrorStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: MirrorStore + ?Sized> SyncStateHandle<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Load the current state, creating and saving a new chain if none exists.
    pub async fn latest(&self) -> Result<SyncState> {
        if let Some(state) = self
            .store
            .load_state()
            .await
            .context("Failed to load sync state")?
        {
            return Ok(state);
        }

        let state = SyncState::new();
        info!("Starting new sync chain {}", state.id);
        self.store
            .save_state(&state)
            .await
            .context("Failed to save new sync state")?;
        Ok(state)
    }

    /// Discard the current chain and start a new one.
    ///
    /// Records of the old chain are pruned by the next run's full sweep, or
    /// deleted immediately when `purge` is set.
    pub async fn fresh(&self, purge: bool) -> Result<SyncState> {
        self.store
            .clear_state()
            .await
            .context("Failed to clear sync state")?;

        if purge {
            let deleted = self.store.delete_all_records().await?;
            info!("Purged {} mirrored records", deleted);
        }

        self.latest().await
    }

    /// Delete every record that was not touched by this chain.
    pub async fn drop_stale(&self, state: &SyncState) -> Result<u64> {
        let dropped = self
            .store
            .delete_stale(&state.id)
            .await
            .context("Failed to drop stale records")?;
        if dropped > 0 {
            info!("Dropped {} records that weren't touched in this sync", dropped);
        }
        Ok(dropped)
    }

    /// Record a completed run.
    pub async fn commit(
        &self,
        state: &mut SyncState,
        cursor: impl Into<String>,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        state.cursor = Some(cursor.into());
        state.last_run_at = Some(finished_at);
        self.store
            .save_state(state)
            .await
            .context("Failed to commit sync cursor")
    }
}
