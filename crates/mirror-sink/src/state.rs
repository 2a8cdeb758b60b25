//! Sync state record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known key of the singleton sync state record.
pub const SYNC_STATE_KEY: &str = "sync_state";

/// Durable state of the sync chain.
///
/// `id` identifies the sync chain: every record touched by a run of this
/// chain is stamped with it as `sync_id`. It only changes when the state is
/// reset, which is what lets the next full sweep recognize every record of the
/// previous chain as stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub id: String,

    /// Resumption cursor from the last completed run
    #[serde(default)]
    pub cursor: Option<String>,

    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,

    /// Set by the webhook ingress, cleared by the runner.
    ///
    /// Informational on load; stores never overwrite it from `save_state`.
    #[serde(default)]
    pub webhook_pending: bool,
}

impl SyncState {
    /// Create the state of a new sync chain with a random identity.
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cursor: None,
            last_run_at: None,
            webhook_pending: false,
        }
    }

    /// Whether the next run must start from scratch.
    pub fn needs_full_refresh(&self) -> bool {
        self.cursor.is_none()
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}
