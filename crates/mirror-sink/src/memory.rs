//! In-process implementation of MirrorStore.
//!
//! Used for tests and for single-process deployments that rebuild the mirror
//! on every start.

use anyhow::Result;
use async_trait::async_trait;
use mirror_types::MirroredRecord;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{MirrorStore, SyncState};

#[derive(Default)]
struct Inner {
    records: BTreeMap<String, MirroredRecord>,
    state: Option<SyncState>,
    webhook_pending: bool,
    leases: HashMap<String, (String, Instant)>,
}

/// MirrorStore backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, ordered by id.
    pub async fn records(&self) -> Vec<MirroredRecord> {
        self.inner.lock().await.records.values().cloned().collect()
    }

    pub async fn record_count(&self) -> usize {
        self.inner.lock().await.records.len()
    }
}

#[async_trait]
impl MirrorStore for MemoryStore {
    async fn find_record(&self, id: &str) -> Result<Option<MirroredRecord>> {
        Ok(self.inner.lock().await.records.get(id).cloned())
    }

    async fn upsert_record(&self, record: &MirroredRecord) -> Result<()> {
        self.inner
            .lock()
            .await
            .records
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<bool> {
        Ok(self.inner.lock().await.records.remove(id).is_some())
    }

    async fn delete_stale(&self, sync_id: &str) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.records.len();
        inner
            .records
            .retain(|_, record| record.sync_id.as_deref().map_or(true, |id| id == sync_id));
        Ok((before - inner.records.len()) as u64)
    }

    async fn delete_all_records(&self) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let count = inner.records.len() as u64;
        inner.records.clear();
        Ok(count)
    }

    async fn load_state(&self) -> Result<Option<SyncState>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.clone().map(|mut state| {
            state.webhook_pending = inner.webhook_pending;
            state
        }))
    }

    async fn save_state(&self, state: &SyncState) -> Result<()> {
        let mut stored = state.clone();
        stored.webhook_pending = false;
        self.inner.lock().await.state = Some(stored);
        Ok(())
    }

    async fn clear_state(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.state = None;
        inner.webhook_pending = false;
        Ok(())
    }

    async fn signal_webhook(&self) -> Result<()> {
        self.inner.lock().await.webhook_pending = true;
        Ok(())
    }

    async fn consume_webhook_signal(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(std::mem::replace(&mut inner.webhook_pending, false))
    }

    async fn acquire_lease(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let available = match inner.leases.get(name) {
            None => true,
            Some((holder, expires_at)) => holder == owner || *expires_at <= now,
        };
        if available {
            inner
                .leases
                .insert(name.to_string(), (owner.to_string(), now + ttl));
        }
        Ok(available)
    }

    async fn release_lease(&self, name: &str, owner: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner
            .leases
            .get(name)
            .is_some_and(|(holder, _)| holder == owner)
        {
            inner.leases.remove(name);
        }
        Ok(())
    }
}
