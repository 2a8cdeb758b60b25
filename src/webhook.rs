//! Webhook ingress.
//!
//! `POST <path>` sets the pending-signal flag in the store; the runner picks
//! it up on its next check. Responses:
//!
//! - `404 Not Found` unless the runner is in webhook mode
//! - `401 Unauthorized` when Basic auth is required and the credentials are
//!   missing or wrong
//! - `200 OK` without signalling when the `X-Contentful-Topic` header does
//!   not match any accepted topic
//! - `202 Accepted` once the signal is stored

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use base64::Engine;
use mirror_engine::SyncMode;
use mirror_sink::MirrorStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::WebhookConfig;

/// Header carrying the event topic, e.g. `ContentManagement.Entry.publish`
pub const TOPIC_HEADER: &str = "x-contentful-topic";

const REALM: &str = "Basic realm=\"content-mirror: authenticate to trigger sync\"";

/// Request checks applied before signalling.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub mode: SyncMode,
    /// `Some((user, password))` when Basic auth is required
    pub credentials: Option<(String, String)>,
    pub accept_topics: Vec<String>,
}

impl WebhookSettings {
    pub fn from_config(config: &WebhookConfig, mode: SyncMode) -> Self {
        let credentials = config.authentication_required.then(|| {
            (
                config.user.clone().unwrap_or_default(),
                config.password.clone().unwrap_or_default(),
            )
        });
        Self {
            mode,
            credentials,
            accept_topics: config.accept_topics.clone(),
        }
    }
}

struct WebhookState<S> {
    store: Arc<S>,
    settings: Arc<WebhookSettings>,
}

impl<S> Clone for WebhookState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// Build the webhook router.
pub fn router<S: MirrorStore + 'static>(
    store: Arc<S>,
    path: &str,
    settings: WebhookSettings,
) -> Router {
    let state = WebhookState {
        store,
        settings: Arc::new(settings),
    };
    Router::new()
        .route(path, post(trigger_sync::<S>))
        .with_state(state)
}

/// Serve the router until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Webhook listener on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Webhook server failed")
}

async fn trigger_sync<S: MirrorStore + 'static>(
    State(state): State<WebhookState<S>>,
    headers: HeaderMap,
) -> Response {
    let settings = &state.settings;
    if settings.mode != SyncMode::Webhook {
        return StatusCode::NOT_FOUND.into_response();
    }

    if let Some((user, password)) = &settings.credentials {
        if !authorized(&headers, user, password) {
            debug!("Rejected webhook with missing or invalid credentials");
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, REALM)],
            )
                .into_response();
        }
    }

    if let Some(topic) = headers.get(TOPIC_HEADER).and_then(|v| v.to_str().ok()) {
        if !topic_accepted(&settings.accept_topics, topic) {
            debug!("Ignoring webhook for topic {}", topic);
            return StatusCode::OK.into_response();
        }
    }

    match state.store.signal_webhook().await {
        Ok(()) => {
            debug!("Webhook signal stored");
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            error!("Failed to store webhook signal: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Check HTTP Basic credentials in constant time.
fn authorized(headers: &HeaderMap, user: &str, password: &str) -> bool {
    let Some((given_user, given_password)) = basic_credentials(headers) else {
        return false;
    };
    // Evaluate both comparisons so timing does not reveal which one failed
    let user_ok = constant_time_eq(given_user.as_bytes(), user.as_bytes());
    let password_ok = constant_time_eq(given_password.as_bytes(), password.as_bytes());
    user_ok & password_ok
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Constant-time comparison to avoid timing side-channels.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

/// An empty pattern list accepts every topic.
fn topic_accepted(patterns: &[String], topic: &str) -> bool {
    patterns.is_empty() || patterns.iter().any(|pattern| wildcard_match(pattern, topic))
}

/// Match `text` against `pattern`, where `*` matches any run of characters.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        // No '*' in the pattern
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
