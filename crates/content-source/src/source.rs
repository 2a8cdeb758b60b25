use async_trait::async_trait;
use mirror_types::RemoteItem;

use crate::SourceError;

/// How a sync run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    /// Full refresh from scratch
    Initial {
        /// Page size hint
        limit: u32,
        /// Item type filter, e.g. "all", "Entry", "Asset"
        scope: String,
    },
    /// Continue from the cursor returned by the previous run
    Resume { cursor: String },
}

impl SyncRequest {
    pub fn initial(limit: u32, scope: impl Into<String>) -> Self {
        Self::Initial {
            limit,
            scope: scope.into(),
        }
    }

    pub fn resume(cursor: impl Into<String>) -> Self {
        Self::Resume {
            cursor: cursor.into(),
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Initial { .. })
    }
}

/// One page of items, in the order the source delivered them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPage {
    pub items: Vec<RemoteItem>,
}

impl SyncPage {
    pub fn new(items: Vec<RemoteItem>) -> Self {
        Self { items }
    }
}

/// A lazily fetched sequence of pages for one sync run.
#[async_trait]
pub trait PageSet: Send {
    /// Fetch the next page. `Ok(None)` once every page has been returned.
    async fn next_page(&mut self) -> Result<Option<SyncPage>, SourceError>;

    /// Cursor to resume from on the next run.
    ///
    /// Only available after `next_page` has returned `Ok(None)`.
    fn resumption_cursor(&self) -> Option<&str>;
}

/// Trait for the remote content API.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Start a sync run.
    async fn start(&self, request: SyncRequest) -> Result<Box<dyn PageSet>, SourceError>;
}
