//! Core types for the content-mirror framework.
//!
//! This crate provides the foundational types shared by every other crate in
//! the workspace:
//!
//! - [`RemoteItem`] - An item as delivered by the remote sync API
//! - [`MirroredRecord`] - The locally persisted representation of an item
//! - [`MappedItem`] / [`MappedChange`] - Output of the item mapper
//! - [`ShapeRegistry`] - Per-kind record shapes, loaded from YAML
//!
//! # Architecture
//!
//! ```text
//! mirror-types (this crate)
//!    │
//!    ├─── content-source   (parses sync API pages into RemoteItem)
//!    ├─── mirror-sink      (stores MirroredRecord and SyncState)
//!    ├─── mirror-mongodb   (MongoDB implementation of the sink)
//!    └─── mirror-engine    (maps RemoteItem into MappedChange and persists it)
//! ```

pub mod item;
pub mod names;
pub mod record;
pub mod shape;

pub use item::{ItemError, ItemType, Link, RemoteItem, RemoteValue};
pub use record::{FieldMap, MappedChange, MappedItem, MirroredRecord};
pub use shape::{FieldType, RecordShape, ShapeError, ShapeRegistry};
