//! HTTP client for the Contentful-style sync API.
//!
//! A run starts with `GET {api_url}/spaces/{space}/environments/{env}/sync`
//! carrying either `initial=true&limit=N&type=T` or `sync_token=T`. Each
//! response holds `items` plus either `nextPageUrl` (more pages in this run)
//! or `nextSyncUrl` (run complete; its `sync_token` is the resumption cursor).

use std::time::Duration;

use async_trait::async_trait;
use mirror_types::RemoteItem;
use reqwest::header::HeaderMap;
use reqwest::{Client as HttpClient, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{ContentSource, PageSet, SourceError, SyncPage, SyncRequest};

/// Public delivery API host
pub const DEFAULT_API_URL: &str = "https://cdn.contentful.com";

/// Maximum number of attempts for a rate-limited request
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BACKOFF_BASE_MS: u64 = 1000;

/// Wait used when a 429 response carries no reset hint
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 1;

/// Client for the sync endpoint of one space environment.
#[derive(Clone)]
pub struct DeliveryClient {
    http_client: HttpClient,
    sync_url: Url,
    access_token: String,
}

impl std::fmt::Debug for DeliveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryClient")
            .field("sync_url", &self.sync_url.as_str())
            .finish()
    }
}

/// Builder for creating a DeliveryClient
#[derive(Default)]
pub struct DeliveryClientBuilder {
    api_url: Option<String>,
    space: Option<String>,
    environment: Option<String>,
    access_token: Option<String>,
    timeout: Option<Duration>,
}

impl DeliveryClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API base URL (defaults to the public delivery API)
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn space(mut self, space: impl Into<String>) -> Self {
        self.space = Some(space.into());
        self
    }

    /// Set the environment (defaults to "master")
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the per-request timeout (defaults to 30 seconds)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<DeliveryClient, SourceError> {
        let space = self
            .space
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SourceError::Config("space is required".to_string()))?;
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SourceError::Config("access token is required".to_string()))?;
        let environment = self.environment.unwrap_or_else(|| "master".to_string());
        let api_url = self.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let sync_url = Url::parse(&format!(
            "{}/spaces/{}/environments/{}/sync",
            api_url.trim_end_matches('/'),
            space,
            environment
        ))
        .map_err(|e| SourceError::Config(format!("invalid api url '{api_url}': {e}")))?;

        let http_client = HttpClient::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(30)))
            .build()?;

        Ok(DeliveryClient {
            http_client,
            sync_url,
            access_token,
        })
    }
}

impl DeliveryClient {
    pub fn builder() -> DeliveryClientBuilder {
        DeliveryClientBuilder::new()
    }

    /// URL of the first page for a request.
    pub fn request_url(&self, request: &SyncRequest) -> Url {
        let mut url = self.sync_url.clone();
        {
            let mut query = url.query_pairs_mut();
            match request {
                SyncRequest::Initial { limit, scope } => {
                    query
                        .append_pair("initial", "true")
                        .append_pair("limit", &limit.to_string())
                        .append_pair("type", scope);
                }
                SyncRequest::Resume { cursor } => {
                    query.append_pair("sync_token", cursor);
                }
            }
        }
        url
    }

    /// Fetch one page, retrying while rate limited.
    async fn fetch(&self, url: &Url) -> Result<SyncResponse, SourceError> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.send(url).await {
                Err(SourceError::RateLimited(wait_secs)) if attempts < MAX_RETRY_ATTEMPTS => {
                    let backoff = calculate_backoff(attempts, wait_secs);
                    warn!(
                        attempt = attempts,
                        wait_ms = backoff,
                        "Rate limited by content source, retrying after backoff"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                result => return result,
            }
        }
    }

    async fn send(&self, url: &Url) -> Result<SyncResponse, SourceError> {
        debug!(url = %redact(url), "Fetching sync page");

        let response = self
            .http_client
            .get(url.clone())
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited(rate_limit_reset(response.headers())));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<SyncResponse>()
            .await
            .map_err(|e| SourceError::InvalidResponse(format!("failed to parse sync page: {e}")))
    }
}

#[async_trait]
impl ContentSource for DeliveryClient {
    async fn start(&self, request: SyncRequest) -> Result<Box<dyn PageSet>, SourceError> {
        Ok(Box::new(DeliveryPageSet {
            next_url: Some(self.request_url(&request)),
            client: self.clone(),
            cursor: None,
        }))
    }
}

/// Raw body of one sync page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    #[serde(default)]
    items: Vec<Value>,
    next_page_url: Option<String>,
    next_sync_url: Option<String>,
}

/// Pages of one run against the delivery API.
struct DeliveryPageSet {
    client: DeliveryClient,
    next_url: Option<Url>,
    cursor: Option<String>,
}

#[async_trait]
impl PageSet for DeliveryPageSet {
    async fn next_page(&mut self) -> Result<Option<SyncPage>, SourceError> {
        let Some(url) = self.next_url.take() else {
            return Ok(None);
        };

        let response = self.client.fetch(&url).await?;

        match (&response.next_page_url, &response.next_sync_url) {
            (Some(next), _) => {
                let next = Url::parse(next).map_err(|e| {
                    SourceError::InvalidResponse(format!("invalid nextPageUrl '{next}': {e}"))
                })?;
                self.next_url = Some(next);
            }
            (None, Some(next_sync)) => {
                self.cursor = Some(sync_token_from(next_sync)?);
            }
            (None, None) => {
                return Err(SourceError::InvalidResponse(
                    "page has neither nextPageUrl nor nextSyncUrl".to_string(),
                ));
            }
        }

        Ok(Some(parse_items(&response.items)))
    }

    fn resumption_cursor(&self) -> Option<&str> {
        if self.next_url.is_some() {
            return None;
        }
        self.cursor.as_deref()
    }
}

/// Parse the items of a page. Items that cannot be parsed are skipped.
fn parse_items(items: &[Value]) -> SyncPage {
    let items = items
        .iter()
        .filter_map(|raw| match RemoteItem::from_json(raw) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping unparseable sync item: {}", e);
                None
            }
        })
        .collect();
    SyncPage::new(items)
}

/// Extract the `sync_token` query parameter of a `nextSyncUrl`.
pub(crate) fn sync_token_from(next_sync_url: &str) -> Result<String, SourceError> {
    let url = Url::parse(next_sync_url).map_err(|e| {
        SourceError::InvalidResponse(format!("invalid nextSyncUrl '{next_sync_url}': {e}"))
    })?;
    url.query_pairs()
        .find(|(key, _)| key == "sync_token")
        .map(|(_, token)| token.into_owned())
        .ok_or_else(|| {
            SourceError::InvalidResponse(format!("nextSyncUrl has no sync_token: {next_sync_url}"))
        })
}

/// Seconds until the rate limit resets, from the response headers.
fn rate_limit_reset(headers: &HeaderMap) -> u64 {
    ["x-contentful-ratelimit-reset", "retry-after"]
        .iter()
        .find_map(|name| headers.get(*name)?.to_str().ok()?.trim().parse().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS)
}

/// Calculate exponential backoff delay in milliseconds
fn calculate_backoff(attempt: u32, suggested_wait_secs: u64) -> u64 {
    let base = BACKOFF_BASE_MS * 2u64.pow(attempt.saturating_sub(1));
    base.max(suggested_wait_secs.saturating_mul(1000))
}

/// The sync token grants read access to the space, keep it out of logs.
fn redact(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if key == "sync_token" {
                "…".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();
    if !pairs.is_empty() {
        redacted.query_pairs_mut().clear().extend_pairs(pairs);
    }
    redacted.to_string()
}
