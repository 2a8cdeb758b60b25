//! content-mirror
//!
//! Keeps a local document store in sync with a Contentful-style content
//! delivery sync API.
//!
//! # Crates
//!
//! - `mirror-types` - remote items, mirrored records, record shapes
//! - `content-source` - sync API client (`DeliveryClient`)
//! - `mirror-sink` - `MirrorStore` trait and the in-memory store
//! - `mirror-mongodb` - MongoDB store
//! - `mirror-engine` - mapper, persistence, sync engine and scheduler
//!
//! This crate holds the configuration, the webhook ingress and the command
//! implementations used by the `content-mirror` binary.
//!
//! # CLI Usage
//!
//! ```bash
//! # Poll the sync API every 15 seconds
//! content-mirror --config content-mirror.toml run
//!
//! # Wait for webhook signals instead
//! content-mirror run --mode webhook
//!
//! # One run, then exit
//! content-mirror sync
//!
//! # Start over with a full refresh
//! content-mirror fresh --purge
//! ```

pub mod app;
pub mod config;
pub mod shutdown;
pub mod webhook;

/// Log filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str =
    "content_mirror=info,mirror_engine=info,content_source=info,mirror_mongodb=info,mirror_sink=info";
