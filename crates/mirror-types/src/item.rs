//! Remote item representation.
//!
//! A [`RemoteItem`] is one element of a sync API page. Items are parsed from
//! the API's JSON shape:
//!
//! ```json
//! {
//!   "sys": { "id": "abc", "type": "Entry", "revision": 3,
//!            "createdAt": "...", "updatedAt": "...",
//!            "contentType": { "sys": { "id": "article" } } },
//!   "fields": { "title": { "en-NZ": "Hello", "mi-NZ": "Kia ora" } },
//!   "metadata": { "tags": [ { "sys": { "id": "tag1" } } ] }
//! }
//! ```

use crate::names::to_snake_case;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Error type for item parsing.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    /// The item has no `sys` object
    #[error("Item is missing its sys block")]
    MissingSys,

    /// A required `sys` attribute is absent or has the wrong type
    #[error("Item is missing sys.{0}")]
    MissingAttribute(&'static str),

    /// A timestamp could not be parsed
    #[error("Invalid timestamp in sys.{field}: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}

/// The type tag carried in `sys.type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    Entry,
    Asset,
    DeletedEntry,
    DeletedAsset,
    /// Any other type tag; such items cannot be mapped.
    Other(String),
}

impl ItemType {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "Entry" => Self::Entry,
            "Asset" => Self::Asset,
            "DeletedEntry" => Self::DeletedEntry,
            "DeletedAsset" => Self::DeletedAsset,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Entry => "Entry",
            Self::Asset => "Asset",
            Self::DeletedEntry => "DeletedEntry",
            Self::DeletedAsset => "DeletedAsset",
            Self::Other(tag) => tag,
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self, Self::DeletedEntry | Self::DeletedAsset)
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A link to another remote item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: String,
    /// `sys.linkType`, e.g. "Entry" or "Asset"
    pub link_type: String,
}

impl Link {
    pub fn new(id: impl Into<String>, link_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            link_type: link_type.into(),
        }
    }

    /// Recognize `{ "sys": { "type": "Link", "id": ..., "linkType": ... } }`.
    fn from_json(value: &Value) -> Option<Self> {
        let sys = value.get("sys")?;
        if sys.get("type")?.as_str()? != "Link" {
            return None;
        }
        Some(Self {
            id: sys.get("id")?.as_str()?.to_string(),
            link_type: sys
                .get("linkType")
                .and_then(Value::as_str)
                .unwrap_or("Entry")
                .to_string(),
        })
    }
}

/// A single localized field value.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    /// Any non-reference value, kept as delivered
    Scalar(Value),
    /// A reference to one other item
    Link(Link),
    /// An ordered list of references
    Links(Vec<Link>),
    /// An asset file descriptor (url, details, fileName, contentType)
    File(Value),
}

impl RemoteValue {
    /// Classify a raw JSON value. A list counts as references when its first
    /// element is a link.
    pub fn classify(value: Value) -> Self {
        if let Some(link) = Link::from_json(&value) {
            return Self::Link(link);
        }
        if let Value::Array(elements) = &value {
            if elements.first().and_then(Link::from_json).is_some() {
                return Self::Links(elements.iter().filter_map(Link::from_json).collect());
            }
        }
        Self::Scalar(value)
    }

    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::Scalar(value.into())
    }
}

/// One item of a sync page.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    pub id: String,
    pub item_type: ItemType,
    /// Content type id; only present on entries
    pub content_type: Option<String>,
    pub revision: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Tag ids from `metadata.tags`
    pub tags: Vec<String>,
    /// snake_case field name → locale code → value
    pub fields: BTreeMap<String, BTreeMap<String, RemoteValue>>,
}

impl RemoteItem {
    /// Create an item with no metadata and no fields.
    pub fn new(id: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            id: id.into(),
            item_type,
            content_type: None,
            revision: None,
            created_at: None,
            updated_at: None,
            tags: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn entry(id: impl Into<String>, content_type: impl Into<String>) -> Self {
        let mut item = Self::new(id, ItemType::Entry);
        item.content_type = Some(content_type.into());
        item
    }

    pub fn asset(id: impl Into<String>) -> Self {
        Self::new(id, ItemType::Asset)
    }

    /// Builder-style helper to add one localized value.
    pub fn with_field(
        mut self,
        field: impl Into<String>,
        locale: impl Into<String>,
        value: RemoteValue,
    ) -> Self {
        self.fields
            .entry(field.into())
            .or_default()
            .insert(locale.into(), value);
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Parse an item from the sync API's JSON representation.
    pub fn from_json(value: &Value) -> Result<Self, ItemError> {
        let sys = value.get("sys").ok_or(ItemError::MissingSys)?;

        let id = sys
            .get("id")
            .and_then(Value::as_str)
            .ok_or(ItemError::MissingAttribute("id"))?
            .to_string();
        let item_type = sys
            .get("type")
            .and_then(Value::as_str)
            .map(ItemType::parse)
            .ok_or(ItemError::MissingAttribute("type"))?;

        let mut item = Self::new(id, item_type);
        item.revision = sys.get("revision").and_then(Value::as_i64);
        item.created_at = parse_timestamp(sys, "createdAt")?;
        item.updated_at = parse_timestamp(sys, "updatedAt")?;
        item.content_type = sys
            .pointer("/contentType/sys/id")
            .and_then(Value::as_str)
            .map(str::to_string);

        if item.item_type.is_deletion() {
            return Ok(item);
        }

        if let Some(tags) = value.pointer("/metadata/tags").and_then(Value::as_array) {
            item.tags = tags
                .iter()
                .filter_map(|tag| tag.pointer("/sys/id").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
        }

        let is_asset = item.item_type == ItemType::Asset;
        if let Some(fields) = value.get("fields").and_then(Value::as_object) {
            for (name, by_locale) in fields {
                let Some(by_locale) = by_locale.as_object() else {
                    continue;
                };
                let field_name = to_snake_case(name);
                let is_file = is_asset && field_name == "file";
                let values = by_locale
                    .iter()
                    .map(|(locale, raw)| {
                        let value = if is_file {
                            RemoteValue::File(raw.clone())
                        } else {
                            RemoteValue::classify(raw.clone())
                        };
                        (locale.clone(), value)
                    })
                    .collect();
                item.fields.insert(field_name, values);
            }
        }

        Ok(item)
    }
}

fn parse_timestamp(sys: &Value, field: &'static str) -> Result<Option<DateTime<Utc>>, ItemError> {
    match sys.get(field).and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|_| ItemError::InvalidTimestamp {
                field,
                value: raw.to_string(),
            }),
    }
}
