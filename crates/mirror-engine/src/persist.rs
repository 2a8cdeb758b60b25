//! Persistence adapter: applies mapped changes to the store.

use anyhow::{Context, Result};
use mirror_sink::MirrorStore;
use mirror_types::{FieldMap, MappedChange, MappedItem, MirroredRecord, RecordShape, ShapeRegistry};
use tracing::{debug, warn};

use crate::SyncStats;

/// Apply one mapped change.
///
/// Deleting a record that does not exist is a no-op. Upserts fully replace
/// the stored field set and stamp the record with `sync_id`. Items without a
/// kind are skipped and leave `stats` untouched.
pub async fn persist_change<S: MirrorStore + ?Sized>(
    store: &S,
    shapes: &ShapeRegistry,
    change: MappedChange,
    sync_id: &str,
    stats: &mut SyncStats,
) -> Result<()> {
    match change {
        MappedChange::Delete { id } => delete_record(store, &id, stats).await,
        MappedChange::Upsert(item) => upsert_record(store, shapes, item, sync_id, stats).await,
    }
}

async fn delete_record<S: MirrorStore + ?Sized>(
    store: &S,
    id: &str,
    stats: &mut SyncStats,
) -> Result<()> {
    let removed = store
        .delete_record(id)
        .await
        .with_context(|| format!("Failed to delete record {id}"))?;

    if removed {
        debug!("Deleted record {}", id);
        stats.record_deleted();
    } else {
        warn!("Deleted record not found: {}", id);
    }
    Ok(())
}

async fn upsert_record<S: MirrorStore + ?Sized>(
    store: &S,
    shapes: &ShapeRegistry,
    item: MappedItem,
    sync_id: &str,
    stats: &mut SyncStats,
) -> Result<()> {
    let Some(kind) = item.kind else {
        debug!("Skipping item {} with unrecognized type", item.id);
        return Ok(());
    };

    let shape = shapes.resolve(&kind);

    let existing = store
        .find_record(&item.id)
        .await
        .with_context(|| format!("Failed to look up record {}", item.id))?;
    if existing.is_some() {
        stats.record_updated();
    } else {
        stats.record_added();
    }

    let record = MirroredRecord {
        fields: apply_shape(shape, &item.id, item.fields),
        id: item.id,
        kind,
        sync_id: Some(sync_id.to_string()),
    };

    store
        .upsert_record(&record)
        .await
        .with_context(|| format!("Failed to persist record {}", record.id))
}

/// Coerce declared fields to their shape's type. Undeclared fields and
/// values that fail coercion are kept as delivered.
fn apply_shape(shape: &RecordShape, id: &str, fields: FieldMap) -> FieldMap {
    if shape.is_generic() {
        return fields;
    }

    fields
        .into_iter()
        .map(|(name, value)| {
            let Some(field_type) = shape.field_type(&name) else {
                return (name, value);
            };
            match field_type.coerce(&name, value.clone()) {
                Ok(coerced) => (name, coerced),
                Err(e) => {
                    warn!("Keeping raw value on {} ({}): {}", id, shape.name, e);
                    (name, value)
                }
            }
        })
        .collect()
}
