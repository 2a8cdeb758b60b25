//! Error type for the content source.

/// Errors raised while fetching sync pages.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The client is missing a required setting
    #[error("Invalid content source configuration: {0}")]
    Config(String),

    /// Transport-level failure (connect, timeout, body read)
    #[error("Request to content source failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("Content source returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Still rate limited after all retries
    #[error("Content source rate limit exceeded, retry after {0}s")]
    RateLimited(u64),

    /// A page did not have the expected shape
    #[error("Invalid sync response: {0}")]
    InvalidResponse(String),

    /// The source could not serve the request at all
    #[error("Content source unavailable: {0}")]
    Unavailable(String),
}
