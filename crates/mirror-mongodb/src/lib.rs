//! MongoDB store for content-mirror
//!
//! Stores mirrored records in a single collection keyed by remote id
//! (`_id`), the sync state as a singleton document, and run leases in a
//! separate collection.

mod convert;
mod store;

pub use convert::{document_to_record, record_to_document};
pub use store::{MongoOpts, MongoStore};
