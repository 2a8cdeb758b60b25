//! MongoDB implementation of MirrorStore.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mirror_sink::{MirrorStore, SyncState, SYNC_STATE_KEY};
use mirror_types::MirroredRecord;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ClientOptions;
use mongodb::{Client as MongoClient, Collection, IndexModel};
use std::time::Duration;

use crate::convert::{document_to_record, record_to_document};

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB connection options (library type without clap)
#[derive(Clone, Debug)]
pub struct MongoOpts {
    pub uri: String,
    pub database: String,
    /// Collection holding the mirrored records
    pub collection: String,
    /// Collection holding the sync state document
    pub state_collection: String,
    /// Collection holding run leases
    pub lock_collection: String,
}

impl MongoOpts {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            collection: "contentful_models".to_string(),
            state_collection: "content_mirror_syncs".to_string(),
            lock_collection: "content_mirror_locks".to_string(),
        }
    }
}

/// MirrorStore backed by a MongoDB database.
pub struct MongoStore {
    records: Collection<Document>,
    states: Collection<Document>,
    locks: Collection<Document>,
}

impl MongoStore {
    /// Connect to MongoDB and make sure the record indexes exist.
    pub async fn connect(opts: &MongoOpts) -> Result<Self> {
        tracing::debug!("Parsing MongoDB connection options from URI");
        let mut mongo_options = ClientOptions::parse(&opts.uri)
            .await
            .context("Failed to parse MongoDB connection options")?;
        // Add connection timeout to prevent hanging
        mongo_options.connect_timeout = Some(Duration::from_secs(10));
        mongo_options.server_selection_timeout = Some(Duration::from_secs(10));

        let client = MongoClient::with_options(mongo_options)?;
        let store = Self::from_client(&client, opts);
        store.ensure_indexes().await?;

        tracing::info!(
            "Connected to MongoDB database '{}' (collection '{}')",
            opts.database,
            opts.collection
        );
        Ok(store)
    }

    /// Build a store from an existing client without touching the server.
    pub fn from_client(client: &MongoClient, opts: &MongoOpts) -> Self {
        let database = client.database(&opts.database);
        Self {
            records: database.collection::<Document>(&opts.collection),
            states: database.collection::<Document>(&opts.state_collection),
            locks: database.collection::<Document>(&opts.lock_collection),
        }
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let index = IndexModel::builder().keys(doc! { "sync_id": 1 }).build();
        self.records
            .create_index(index)
            .await
            .context("Failed to create sync_id index")?;
        Ok(())
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        _ => false,
    }
}

fn state_from_document(document: &Document) -> Option<SyncState> {
    let id = document.get_str("chain_id").ok()?.to_string();
    Some(SyncState {
        id,
        cursor: document.get_str("cursor").ok().map(str::to_string),
        last_run_at: document
            .get_datetime("last_run_at")
            .ok()
            .map(|ts| ts.to_chrono()),
        webhook_pending: document.get_bool("webhook_pending").unwrap_or(false),
    })
}

#[async_trait]
impl MirrorStore for MongoStore {
    async fn find_record(&self, id: &str) -> Result<Option<MirroredRecord>> {
        match self.records.find_one(doc! { "_id": id }).await? {
            Some(document) => Ok(Some(document_to_record(document)?)),
            None => Ok(None),
        }
    }

    async fn upsert_record(&self, record: &MirroredRecord) -> Result<()> {
        let document = record_to_document(record)?;
        self.records
            .replace_one(doc! { "_id": record.id.as_str() }, document)
            .upsert(true)
            .await
            .with_context(|| format!("Failed to write record {}", record.id))?;
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<bool> {
        let result = self.records.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_stale(&self, sync_id: &str) -> Result<u64> {
        let filter = doc! { "sync_id": { "$ne": sync_id, "$exists": true } };
        let result = self.records.delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    async fn delete_all_records(&self) -> Result<u64> {
        let result = self.records.delete_many(doc! {}).await?;
        Ok(result.deleted_count)
    }

    async fn load_state(&self) -> Result<Option<SyncState>> {
        let document = self.states.find_one(doc! { "_id": SYNC_STATE_KEY }).await?;
        Ok(document.as_ref().and_then(state_from_document))
    }

    async fn save_state(&self, state: &SyncState) -> Result<()> {
        let cursor = state
            .cursor
            .as_ref()
            .map(|c| Bson::String(c.clone()))
            .unwrap_or(Bson::Null);
        let last_run_at = state
            .last_run_at
            .map(|ts| Bson::DateTime(bson::DateTime::from_chrono(ts)))
            .unwrap_or(Bson::Null);

        self.states
            .update_one(
                doc! { "_id": SYNC_STATE_KEY },
                doc! { "$set": {
                    "chain_id": state.id.as_str(),
                    "cursor": cursor,
                    "last_run_at": last_run_at,
                } },
            )
            .upsert(true)
            .await
            .context("Failed to save sync state")?;
        Ok(())
    }

    async fn clear_state(&self) -> Result<()> {
        self.states
            .delete_one(doc! { "_id": SYNC_STATE_KEY })
            .await?;
        Ok(())
    }

    async fn signal_webhook(&self) -> Result<()> {
        self.states
            .update_one(
                doc! { "_id": SYNC_STATE_KEY },
                doc! { "$set": { "webhook_pending": true } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn consume_webhook_signal(&self) -> Result<bool> {
        let previous = self
            .states
            .find_one_and_update(
                doc! { "_id": SYNC_STATE_KEY, "webhook_pending": true },
                doc! { "$set": { "webhook_pending": false } },
            )
            .await?;
        Ok(previous.is_some())
    }

    async fn acquire_lease(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let now = bson::DateTime::now();
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at =
            bson::DateTime::from_millis(now.timestamp_millis().saturating_add(ttl_millis));

        let filter = doc! {
            "_id": name,
            "$or": [
                { "expires_at": { "$lte": now } },
                { "owner": owner },
            ],
        };
        let update = doc! { "$set": { "owner": owner, "expires_at": expires_at } };

        match self.locks.update_one(filter, update).upsert(true).await {
            Ok(_) => Ok(true),
            // Another owner holds an unexpired lease: the upsert collides on _id
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_lease(&self, name: &str, owner: &str) -> Result<()> {
        self.locks
            .delete_one(doc! { "_id": name, "owner": owner })
            .await?;
        Ok(())
    }
}
