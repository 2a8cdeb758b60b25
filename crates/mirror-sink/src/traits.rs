//! MirrorStore trait definition.

use anyhow::Result;
use mirror_types::MirroredRecord;
use std::time::Duration;

use crate::SyncState;

/// Trait for the document store that holds the mirror.
///
/// # Usage Pattern
///
/// The engine is generic over the store for zero-cost dispatch:
///
/// ```ignore
/// pub async fn persist<S: MirrorStore + ?Sized>(store: &S, record: &MirroredRecord) -> Result<()> {
///     store.upsert_record(record).await
/// }
/// ```
///
/// The CLI entry point branches once on the configured backend, and after
/// that all code is monomorphized for the specific implementation.
#[async_trait::async_trait]
pub trait MirrorStore: Send + Sync {
    /// Find a record by remote id.
    async fn find_record(&self, id: &str) -> Result<Option<MirroredRecord>>;

    /// Insert or fully replace the record with the same id.
    async fn upsert_record(&self, record: &MirroredRecord) -> Result<()>;

    /// Delete a record by id. Returns whether a record was removed.
    async fn delete_record(&self, id: &str) -> Result<bool>;

    /// Delete every record whose `sync_id` is set and differs from `sync_id`.
    ///
    /// Records without a `sync_id` are never deleted. Returns the number of
    /// deleted records.
    async fn delete_stale(&self, sync_id: &str) -> Result<u64>;

    /// Delete every mirrored record.
    async fn delete_all_records(&self) -> Result<u64>;

    /// Load the singleton sync state, if any.
    async fn load_state(&self) -> Result<Option<SyncState>>;

    /// Save the sync state's identity, cursor and last run time.
    ///
    /// Must not modify the pending webhook flag, which may have been set by
    /// the ingress while a run was in progress.
    async fn save_state(&self, state: &SyncState) -> Result<()>;

    /// Remove the sync state (including any pending signal).
    async fn clear_state(&self) -> Result<()>;

    /// Set the pending webhook flag.
    async fn signal_webhook(&self) -> Result<()>;

    /// Atomically read and clear the pending webhook flag.
    async fn consume_webhook_signal(&self) -> Result<bool>;

    /// Try to take the named lease for `owner` for `ttl`.
    ///
    /// Succeeds when the lease is free, expired, or already held by `owner`
    /// (which extends it).
    async fn acquire_lease(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Release the named lease if `owner` holds it.
    async fn release_lease(&self, name: &str, owner: &str) -> Result<()>;
}
