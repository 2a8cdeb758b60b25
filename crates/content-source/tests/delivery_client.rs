//! DeliveryClient against a local HTTP responder.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use content_source::{ContentSource, DeliveryClient, SourceError, SyncRequest};
use serde_json::json;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct SeenRequest {
    target: String,
    authorization: Option<String>,
}

type Responder = Arc<dyn Fn(&str, usize) -> (u16, Vec<(&'static str, String)>, String) + Send + Sync>;

#[derive(Clone)]
struct ServerState {
    respond: Responder,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

/// Record the request, then answer with whatever the responder scripts for it.
async fn scripted_response(State(state): State<ServerState>, uri: Uri, headers: HeaderMap) -> Response {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let index = {
        let mut seen = state.seen.lock().unwrap();
        seen.push(SeenRequest {
            target: target.clone(),
            authorization,
        });
        seen.len() - 1
    };

    let (status, extra_headers, body) = (state.respond)(&target, index);
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in extra_headers {
        response_headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(&value).unwrap(),
        );
    }
    (StatusCode::from_u16(status).unwrap(), response_headers, body).into_response()
}

/// Start a local server; `respond` gets the request target and the 0-based
/// request number.
async fn serve(respond: Responder) -> (SocketAddr, Arc<Mutex<Vec<SeenRequest>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(scripted_response).with_state(ServerState {
        respond,
        seen: seen.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, seen)
}

fn client(addr: SocketAddr) -> DeliveryClient {
    DeliveryClient::builder()
        .api_url(format!("http://{addr}"))
        .space("space1")
        .access_token("secret-token")
        .build()
        .unwrap()
}

fn entry(id: &str) -> serde_json::Value {
    json!({
        "sys": { "id": id, "type": "Entry", "revision": 1,
                 "contentType": { "sys": { "id": "page" } } },
        "fields": { "title": { "en-NZ": id } }
    })
}

#[tokio::test]
async fn test_follows_next_page_url_until_next_sync_url() {
    let addr_cell = Arc::new(Mutex::new(String::new()));
    let base = addr_cell.clone();
    let responder: Responder = Arc::new(move |_target: &str, index: usize| {
        let base = base.lock().unwrap().clone();
        let body = match index {
            0 => json!({
                "items": [entry("A"), entry("B")],
                "nextPageUrl": format!("{base}/spaces/space1/environments/master/sync?sync_token=page2"),
            }),
            _ => json!({
                "items": [{ "sys": { "id": "C", "type": "DeletedEntry" } }],
                "nextSyncUrl": format!("{base}/spaces/space1/environments/master/sync?sync_token=next1"),
            }),
        };
        (200, Vec::new(), body.to_string())
    });
    let (addr, seen) = serve(responder).await;
    *addr_cell.lock().unwrap() = format!("http://{addr}");

    let mut pages = client(addr)
        .start(SyncRequest::initial(2, "all"))
        .await
        .unwrap();

    let first = pages.next_page().await.unwrap().unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(pages.resumption_cursor(), None);

    let second = pages.next_page().await.unwrap().unwrap();
    assert_eq!(second.items[0].id, "C");
    assert!(second.items[0].item_type.is_deletion());

    assert!(pages.next_page().await.unwrap().is_none());
    assert_eq!(pages.resumption_cursor(), Some("next1"));

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[0].target,
        "/spaces/space1/environments/master/sync?initial=true&limit=2&type=all"
    );
    assert_eq!(
        seen[1].target,
        "/spaces/space1/environments/master/sync?sync_token=page2"
    );
    assert_eq!(
        seen[0].authorization.as_deref(),
        Some("Bearer secret-token")
    );
}

#[tokio::test]
async fn test_retries_after_rate_limit() {
    let responder: Responder = Arc::new(|_target: &str, index: usize| {
        if index == 0 {
            return (
                429,
                vec![("x-contentful-ratelimit-reset", "0".to_string())],
                "{}".to_string(),
            );
        }
        let body = json!({
            "items": [],
            "nextSyncUrl": "https://cdn.example.com/sync?sync_token=after-retry",
        });
        (200, Vec::new(), body.to_string())
    });
    let (addr, seen) = serve(responder).await;

    let mut pages = client(addr)
        .start(SyncRequest::resume("c1"))
        .await
        .unwrap();
    assert!(pages.next_page().await.unwrap().unwrap().items.is_empty());
    assert!(pages.next_page().await.unwrap().is_none());
    assert_eq!(pages.resumption_cursor(), Some("after-retry"));
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let responder: Responder = Arc::new(|_target: &str, _index: usize| {
        (401, Vec::new(), r#"{"message":"bad token"}"#.to_string())
    });
    let (addr, _seen) = serve(responder).await;

    let mut pages = client(addr)
        .start(SyncRequest::resume("c1"))
        .await
        .unwrap();
    match pages.next_page().await {
        Err(SourceError::Status { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("bad token"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert_eq!(pages.resumption_cursor(), None);
}
