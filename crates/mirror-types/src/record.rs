//! Mirrored record and mapper output types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Ordered mapping of field name to stored value.
pub type FieldMap = BTreeMap<String, Value>;

/// The locally persisted representation of a remote item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirroredRecord {
    /// Remote identity, stable across runs
    pub id: String,
    /// Content type id, or "asset"
    pub kind: String,
    /// Identity of the sync chain that last touched this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    /// Dynamic fields produced by the mapper
    #[serde(default)]
    pub fields: FieldMap,
}

impl MirroredRecord {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            sync_id: None,
            fields: FieldMap::new(),
        }
    }

    pub fn with_sync_id(mut self, sync_id: impl Into<String>) -> Self {
        self.sync_id = Some(sync_id.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Ids stored in an `<name>_ids` reference list, in stored order.
    pub fn reference_ids(&self, ids_field: &str) -> Vec<&str> {
        self.fields
            .get(ids_field)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Re-derive the stored order of a reference list over a set of loaded
    /// records. Records whose id is not in the list are dropped.
    pub fn ordered_by_ids<'a>(
        &self,
        ids_field: &str,
        referenced: &'a [MirroredRecord],
    ) -> Vec<&'a MirroredRecord> {
        let order = self.reference_ids(ids_field);
        let mut ordered: Vec<(usize, &MirroredRecord)> = referenced
            .iter()
            .filter_map(|record| {
                order
                    .iter()
                    .position(|id| *id == record.id)
                    .map(|index| (index, record))
            })
            .collect();
        ordered.sort_by_key(|(index, _)| *index);
        ordered.into_iter().map(|(_, record)| record).collect()
    }
}

/// A remote item ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedItem {
    pub id: String,
    /// `None` means the item type is not recognized and must be skipped
    pub kind: Option<String>,
    pub fields: FieldMap,
}

/// Output of the item mapper: either a deletion or an upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedChange {
    Delete { id: String },
    Upsert(MappedItem),
}

impl MappedChange {
    pub fn id(&self) -> &str {
        match self {
            Self::Delete { id } => id,
            Self::Upsert(item) => &item.id,
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}
