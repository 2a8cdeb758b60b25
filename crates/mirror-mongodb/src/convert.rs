//! Conversion between mirrored records and BSON documents.
//!
//! A record is stored flat: `{ _id, kind, sync_id, ...fields }`. A record
//! without a `sync_id` has no `sync_id` key at all, so the stale-record query
//! (`$exists: true`) never matches it.

use anyhow::Result;
use bson::{Bson, Document};
use mirror_types::{FieldMap, MirroredRecord};

/// Convert a record into the document stored in MongoDB.
pub fn record_to_document(record: &MirroredRecord) -> Result<Document> {
    let mut document = Document::new();
    document.insert("_id", record.id.as_str());

    for (name, value) in &record.fields {
        if name == "_id" || name == "sync_id" {
            tracing::warn!("Ignoring reserved field '{}' on record {}", name, record.id);
            continue;
        }
        document.insert(name.clone(), bson::to_bson(value)?);
    }

    document.insert("kind", record.kind.as_str());
    if let Some(sync_id) = &record.sync_id {
        document.insert("sync_id", sync_id.as_str());
    }

    Ok(document)
}

/// Convert a stored document back into a record.
pub fn document_to_record(mut document: Document) -> Result<MirroredRecord> {
    let id = match document.remove("_id") {
        Some(Bson::String(id)) => id,
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(other) => anyhow::bail!("Unsupported _id type in mirrored record: {other}"),
        None => anyhow::bail!("Mirrored record document has no _id"),
    };

    let sync_id = match document.remove("sync_id") {
        Some(Bson::String(sync_id)) => Some(sync_id),
        _ => None,
    };

    let kind = document
        .get_str("kind")
        .map(str::to_string)
        .unwrap_or_default();

    let fields: FieldMap = document
        .into_iter()
        .map(|(name, value)| (name, value.into_relaxed_extjson()))
        .collect();

    Ok(MirroredRecord {
        id,
        kind,
        sync_id,
        fields,
    })
}
