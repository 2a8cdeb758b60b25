//! Document store abstraction.
//!
//! This crate defines the `MirrorStore` trait that abstracts over the
//! document store holding the mirror. The sync engine only talks to this
//! trait; `MemoryStore` (this crate) and `MongoStore` (mirror-mongodb) both
//! implement it.
//!
//! The store holds three kinds of data:
//! - mirrored records, keyed by remote id
//! - the singleton [`SyncState`] (cursor, last run, pending webhook signal)
//! - run leases used for cross-process run exclusion

mod memory;
mod state;
mod traits;

pub use memory::MemoryStore;
pub use state::{SyncState, SYNC_STATE_KEY};
pub use traits::MirrorStore;
