//! Remote content source for content-mirror
//!
//! The engine talks to the remote sync API through two traits:
//!
//! - [`ContentSource`] starts a sync run from a [`SyncRequest`]
//! - [`PageSet`] yields the run's pages lazily and, once exhausted, the
//!   cursor to resume from next time
//!
//! [`DeliveryClient`] implements them over HTTP for a Contentful-style sync
//! endpoint. [`testing::ScriptedSource`] replays canned pages in-process.

mod client;
mod error;
mod source;
pub mod testing;

pub use client::{DeliveryClient, DeliveryClientBuilder, DEFAULT_API_URL};
pub use error::SourceError;
pub use source::{ContentSource, PageSet, SyncPage, SyncRequest};
