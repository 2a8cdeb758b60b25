//! Item mapper: turns a remote item into a storable change.
//!
//! Field naming:
//!
//! | Remote value                  | Default locale | Other locale (`mi-NZ`) |
//! |-------------------------------|----------------|------------------------|
//! | scalar `title`                | `title`        | `title_mi_nz`          |
//! | link `author`                 | `author_id`    | `author_mi_nz_id`      |
//! | link list `tags`              | `tag_ids`      | `tags_mi_nz_ids`       |
//! | asset file descriptor `file`  | `file`         | `file_mi_nz`           |
//!
//! Every upsert also carries the generic fields `created_at`, `updated_at`,
//! `revision`, `kind`, `contentful_tags` and `synced_at`, plus
//! `source_created_at` / `source_updated_at` when timestamp preservation is on.

use chrono::{DateTime, SecondsFormat, Utc};
use mirror_types::names::{normalize_locale, singularize};
use mirror_types::{FieldMap, ItemType, MappedChange, MappedItem, RemoteItem, RemoteValue};
use serde_json::Value;
use tracing::debug;

/// Locale whose values are stored under bare field names
pub const DEFAULT_LOCALE: &str = "en-NZ";

/// Kind assigned to assets
pub const ASSET_KIND: &str = "asset";

/// Mapper configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperOptions {
    pub locale: String,
    /// Allow-list of tag ids. When non-empty, only tagged items are mirrored.
    pub content_tags: Vec<String>,
    /// Deny-list of tag ids. Ignored when `content_tags` is non-empty.
    pub ignore_content_tags: Vec<String>,
    pub preserve_timestamps: bool,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            content_tags: Vec::new(),
            ignore_content_tags: Vec::new(),
            preserve_timestamps: false,
        }
    }
}

/// Maps [`RemoteItem`]s into [`MappedChange`]s.
#[derive(Debug, Clone, Default)]
pub struct ItemMapper {
    options: MapperOptions,
}

impl ItemMapper {
    pub fn new(options: MapperOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    pub fn is_deletion(&self, item: &RemoteItem) -> bool {
        item.item_type.is_deletion()
    }

    /// Whether the tag filter keeps this item out of the mirror.
    pub fn excluded_by_tag(&self, item: &RemoteItem) -> bool {
        let has_any = |list: &[String]| item.tags.iter().any(|tag| list.contains(tag));

        if !self.options.content_tags.is_empty() {
            return !has_any(&self.options.content_tags);
        }
        if !self.options.ignore_content_tags.is_empty() {
            return has_any(&self.options.ignore_content_tags);
        }
        false
    }

    /// Content type id for entries, "asset" for assets, `None` otherwise.
    pub fn kind(&self, item: &RemoteItem) -> Option<String> {
        match item.item_type {
            ItemType::Entry => item.content_type.clone(),
            ItemType::Asset => Some(ASSET_KIND.to_string()),
            _ => None,
        }
    }

    /// Map an item, stamping `synced_at` with the current time.
    pub fn map(&self, item: &RemoteItem) -> MappedChange {
        self.map_at(item, Utc::now())
    }

    pub fn map_at(&self, item: &RemoteItem, synced_at: DateTime<Utc>) -> MappedChange {
        if self.is_deletion(item) {
            return MappedChange::Delete {
                id: item.id.clone(),
            };
        }
        if self.excluded_by_tag(item) {
            debug!("Item {} excluded by tag filter", item.id);
            return MappedChange::Delete {
                id: item.id.clone(),
            };
        }

        let kind = self.kind(item);
        let mut fields = self.generic_fields(item, kind.as_deref(), synced_at);
        self.localized_fields(item, &mut fields);

        MappedChange::Upsert(MappedItem {
            id: item.id.clone(),
            kind,
            fields,
        })
    }

    fn generic_fields(
        &self,
        item: &RemoteItem,
        kind: Option<&str>,
        synced_at: DateTime<Utc>,
    ) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("created_at".to_string(), timestamp(item.created_at));
        fields.insert("updated_at".to_string(), timestamp(item.updated_at));
        fields.insert(
            "revision".to_string(),
            item.revision.map(Value::from).unwrap_or(Value::Null),
        );
        fields.insert(
            "kind".to_string(),
            kind.map(Value::from).unwrap_or(Value::Null),
        );
        fields.insert(
            "contentful_tags".to_string(),
            Value::from(item.tags.clone()),
        );
        fields.insert("synced_at".to_string(), timestamp(Some(synced_at)));

        if self.options.preserve_timestamps {
            fields.insert("source_created_at".to_string(), timestamp(item.created_at));
            fields.insert("source_updated_at".to_string(), timestamp(item.updated_at));
        }
        fields
    }

    fn localized_fields(&self, item: &RemoteItem, fields: &mut FieldMap) {
        for (field, by_locale) in &item.fields {
            for (locale, value) in by_locale {
                let name = self.localized_name(field, locale);
                let (name, value) = match value {
                    RemoteValue::Scalar(v) | RemoteValue::File(v) => (name, v.clone()),
                    RemoteValue::Link(link) => (format!("{name}_id"), Value::from(link.id.clone())),
                    RemoteValue::Links(links) => (
                        format!("{}_ids", singularize(&name)),
                        Value::from(
                            links
                                .iter()
                                .map(|link| link.id.clone())
                                .collect::<Vec<_>>(),
                        ),
                    ),
                };
                fields.insert(name, value);
            }
        }
    }

    /// Suffix the field with the normalized locale unless it is the default.
    fn localized_name(&self, field: &str, locale: &str) -> String {
        if locale == self.options.locale {
            field.to_string()
        } else {
            format!("{field}_{}", normalize_locale(locale))
        }
    }
}

fn timestamp(ts: Option<DateTime<Utc>>) -> Value {
    ts.map(|ts| Value::from(ts.to_rfc3339_opts(SecondsFormat::Millis, true)))
        .unwrap_or(Value::Null)
}
