//! Webhook ingress: status codes and the stored signal.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine;
use content_mirror::config::WebhookConfig;
use content_mirror::webhook::{self, WebhookSettings, TOPIC_HEADER};
use mirror_engine::SyncMode;
use mirror_sink::{MemoryStore, MirrorStore};
use tower::ServiceExt;

const PATH: &str = "/consyncful/webhook";

fn settings(mode: SyncMode) -> WebhookSettings {
    let config = WebhookConfig {
        user: Some("hook".to_string()),
        password: Some("s3cret".to_string()),
        ..WebhookConfig::default()
    };
    WebhookSettings::from_config(&config, mode)
}

fn app(store: &Arc<MemoryStore>, settings: WebhookSettings) -> Router {
    webhook::router(store.clone(), PATH, settings)
}

fn basic(user: &str, password: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
    format!("Basic {encoded}")
}

fn post(auth: Option<String>, topic: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(PATH);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    if let Some(topic) = topic {
        builder = builder.header(TOPIC_HEADER, topic);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_not_found_in_poll_mode() {
    let store = Arc::new(MemoryStore::new());
    let response = app(&store, settings(SyncMode::Poll))
        .oneshot(post(Some(basic("hook", "s3cret")), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!store.consume_webhook_signal().await.unwrap());
}

#[tokio::test]
async fn test_missing_or_wrong_credentials_are_rejected() {
    let store = Arc::new(MemoryStore::new());

    for auth in [None, Some(basic("hook", "wrong")), Some(basic("other", "s3cret"))] {
        let response = app(&store, settings(SyncMode::Webhook))
            .oneshot(post(auth, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
    assert!(!store.consume_webhook_signal().await.unwrap());
}

#[tokio::test]
async fn test_accepted_request_sets_signal() {
    let store = Arc::new(MemoryStore::new());
    let response = app(&store, settings(SyncMode::Webhook))
        .oneshot(post(
            Some(basic("hook", "s3cret")),
            Some("ContentManagement.Entry.publish"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(store.consume_webhook_signal().await.unwrap());
    assert!(!store.consume_webhook_signal().await.unwrap());
}

#[tokio::test]
async fn test_unmatched_topic_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    let response = app(&store, settings(SyncMode::Webhook))
        .oneshot(post(
            Some(basic("hook", "s3cret")),
            Some("ContentManagement.ContentType.publish"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!store.consume_webhook_signal().await.unwrap());
}

#[tokio::test]
async fn test_no_credentials_needed_when_auth_disabled() {
    let store = Arc::new(MemoryStore::new());
    let config = WebhookConfig {
        authentication_required: false,
        ..WebhookConfig::default()
    };
    let response = app(&store, WebhookSettings::from_config(&config, SyncMode::Webhook))
        .oneshot(post(None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(store.consume_webhook_signal().await.unwrap());
}

#[tokio::test]
async fn test_get_is_not_allowed() {
    let store = Arc::new(MemoryStore::new());
    let request = Request::builder()
        .method("GET")
        .uri(PATH)
        .body(Body::empty())
        .unwrap();
    let response = app(&store, settings(SyncMode::Webhook))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
