//! Record shape definitions for mirrored content types.
//!
//! The mirror stores schema-less records, but some content types are worth
//! describing: a [`RecordShape`] declares the semantic type of selected
//! fields so that values are stored consistently (timestamps normalized,
//! numeric strings turned into numbers). Kinds without a registered shape use
//! the generic fallback, which declares nothing and accepts every field.
//!
//! ## YAML format
//!
//! ```yaml
//! shapes:
//!   - kind: article
//!     name: Article
//!     fields:
//!       title: text
//!       published_at: datetime
//!       author_id: reference
//!       tag_ids: reference_list
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for shape operations.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    /// Error reading shape file
    #[error("Failed to read shape file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The same kind is registered twice
    #[error("Duplicate shape for kind: {0}")]
    DuplicateKind(String),

    /// A value does not fit the declared field type
    #[error("Field '{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        actual: String,
    },
}

// ============================================================================
// Field Types
// ============================================================================

/// Semantic type of a mirrored field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    /// RFC 3339 timestamp, stored normalized to UTC with millisecond precision
    Datetime,
    /// Arbitrary structured value (rich text, objects, lists)
    Json,
    /// Asset file descriptor
    File,
    /// Id of another record
    Reference,
    /// Ordered list of record ids
    ReferenceList,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::Json => "json",
            Self::File => "file",
            Self::Reference => "reference",
            Self::ReferenceList => "reference_list",
        }
    }

    /// Convert `value` into the canonical representation of this type.
    ///
    /// `null` is accepted by every type.
    pub fn coerce(&self, field: &str, value: Value) -> Result<Value, ShapeError> {
        if value.is_null() {
            return Ok(value);
        }

        let mismatch = |value: &Value| ShapeError::TypeMismatch {
            field: field.to_string(),
            expected: *self,
            actual: json_type_name(value).to_string(),
        };

        match self {
            Self::Json | Self::File => Ok(value),
            Self::Text => match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(mismatch(&other)),
            },
            Self::Integer if value.is_i64() || value.is_u64() => Ok(value),
            Self::Integer => match &value {
                Value::Number(n) => match n.as_f64() {
                    // i64::MAX as f64 rounds up to 2^63, which is already out of range
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        Ok(Value::from(f as i64))
                    }
                    _ => Err(mismatch(&value)),
                },
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            Self::Float => match &value {
                Value::Number(n) => n.as_f64().map(Value::from).ok_or_else(|| mismatch(&value)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::from)
                    .map_err(|_| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            Self::Boolean => match &value {
                Value::Bool(_) => Ok(value),
                Value::String(s) if s == "true" => Ok(Value::Bool(true)),
                Value::String(s) if s == "false" => Ok(Value::Bool(false)),
                _ => Err(mismatch(&value)),
            },
            Self::Datetime => match &value {
                Value::String(s) => DateTime::parse_from_rfc3339(s)
                    .map(|ts| {
                        Value::String(
                            ts.with_timezone(&Utc)
                                .to_rfc3339_opts(SecondsFormat::Millis, true),
                        )
                    })
                    .map_err(|_| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            Self::Reference => match &value {
                Value::String(_) => Ok(value),
                _ => Err(mismatch(&value)),
            },
            Self::ReferenceList => {
                let all_ids = value
                    .as_array()
                    .map(|ids| ids.iter().all(Value::is_string))
                    .unwrap_or(false);
                if all_ids {
                    Ok(value)
                } else {
                    Err(mismatch(&value))
                }
            }
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Shapes and Registry
// ============================================================================

/// Declared shape of the records of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordShape {
    /// Content type id this shape applies to
    pub kind: String,

    /// Human-readable shape name
    pub name: String,

    /// Declared fields; undeclared fields pass through unchanged
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
}

impl RecordShape {
    pub const GENERIC_NAME: &'static str = "Base";

    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// The fallback shape used for kinds without a registered shape.
    pub fn generic() -> Self {
        Self::new("*", Self::GENERIC_NAME)
    }

    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    pub fn is_generic(&self) -> bool {
        self.name == Self::GENERIC_NAME && self.kind == "*"
    }

    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.fields.get(field).copied()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ShapeFile {
    #[serde(default)]
    shapes: Vec<RecordShape>,
}

/// Registry mapping a kind to its declared [`RecordShape`].
#[derive(Debug, Clone)]
pub struct ShapeRegistry {
    shapes: HashMap<String, RecordShape>,
    generic: RecordShape,
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeRegistry {
    /// Create a registry with only the generic fallback.
    pub fn new() -> Self {
        Self {
            shapes: HashMap::new(),
            generic: RecordShape::generic(),
        }
    }

    /// Register a shape, rejecting a second shape for the same kind.
    pub fn register(&mut self, shape: RecordShape) -> Result<(), ShapeError> {
        if self.shapes.contains_key(&shape.kind) {
            return Err(ShapeError::DuplicateKind(shape.kind));
        }
        self.shapes.insert(shape.kind.clone(), shape);
        Ok(())
    }

    /// Parse a registry from a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ShapeError> {
        let file: ShapeFile = serde_yaml::from_str(content)?;
        let mut registry = Self::new();
        for shape in file.shapes {
            registry.register(shape)?;
        }
        Ok(registry)
    }

    /// Load a registry from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ShapeError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Resolve the shape for `kind`, falling back to the generic shape.
    pub fn resolve(&self, kind: &str) -> &RecordShape {
        self.shapes.get(kind).unwrap_or(&self.generic)
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.shapes.contains_key(kind)
    }

    /// Get all registered kinds.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.shapes.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const SHAPES: &str = r#"
shapes:
  - kind: article
    name: Article
    fields:
      title: text
      published_at: datetime
      view_count: integer
      tag_ids: reference_list
  - kind: author
    name: Author
"#;

    #[test]
    fn test_resolve_registered_and_fallback() {
        let registry = ShapeRegistry::from_yaml(SHAPES).unwrap();

        let article = registry.resolve("article");
        assert_eq!(article.name, "Article");
        assert_eq!(article.field_type("published_at"), Some(FieldType::Datetime));

        let unknown = registry.resolve("recipe");
        assert!(unknown.is_generic());
        assert_eq!(registry.kinds(), vec!["article", "author"]);
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let yaml = "shapes:\n  - kind: a\n    name: A\n  - kind: a\n    name: B\n";
        assert!(matches!(
            ShapeRegistry::from_yaml(yaml),
            Err(ShapeError::DuplicateKind(kind)) if kind == "a"
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SHAPES.as_bytes()).unwrap();

        let registry = ShapeRegistry::from_file(file.path()).unwrap();
        assert!(registry.is_registered("author"));
    }

    #[test]
    fn test_coerce_datetime_normalizes() {
        let value = FieldType::Datetime
            .coerce("published_at", json!("2019-02-20T13:50:17+13:00"))
            .unwrap();
        assert_eq!(value, json!("2019-02-20T00:50:17.000Z"));
    }

    #[test]
    fn test_coerce_integer_from_string() {
        assert_eq!(
            FieldType::Integer.coerce("n", json!("42")).unwrap(),
            json!(42)
        );
        assert_eq!(FieldType::Integer.coerce("n", json!(3.0)).unwrap(), json!(3));
        assert!(FieldType::Integer.coerce("n", json!("x")).is_err());
    }

    #[test]
    fn test_coerce_integer_rejects_out_of_range_float() {
        assert!(matches!(
            FieldType::Integer.coerce("n", json!(1e30)),
            Err(ShapeError::TypeMismatch { .. })
        ));
        assert!(FieldType::Integer.coerce("n", json!(-1e19)).is_err());
        assert_eq!(
            FieldType::Integer.coerce("n", json!(-9.0e15)).unwrap(),
            json!(-9_000_000_000_000_000i64)
        );
    }

    #[test]
    fn test_coerce_reference_list_rejects_objects() {
        let err = FieldType::ReferenceList
            .coerce("tag_ids", json!([{"id": "T1"}]))
            .unwrap_err();
        assert!(err.to_string().contains("reference_list"));
    }

    #[test]
    fn test_null_is_always_accepted() {
        for field_type in [FieldType::Text, FieldType::Datetime, FieldType::Reference] {
            assert_eq!(field_type.coerce("f", Value::Null).unwrap(), Value::Null);
        }
    }
}
