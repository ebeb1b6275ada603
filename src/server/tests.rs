use super::*;
use axum::body::Body;
use axum::http::{header, Request};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tower::ServiceExt;

use super::auth::ApiKeyEntry;

async fn test_state(keys: Vec<ApiKeyEntry>) -> (TempDir, AppState) {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = SectionStore::open(&temp_dir.path().join("sections.db"))
        .await
        .unwrap();
    (temp_dir, AppState::new(store, ApiKeyStore::from_entries(keys)))
}

fn put_request(uri: &str, body: Value, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (_dir, state) = test_state(vec![]).await;

    let response = router(state).oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_put_then_get_content() {
    let (_dir, state) = test_state(vec![]).await;
    let app = router(state);
    let content = json!([{"type": "paragraph", "text": "draft"}]);

    let response = app
        .clone()
        .oneshot(put_request(
            "/sections/sec-1/content",
            json!({ "content": content }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let written = body_json(response).await;
    assert_eq!(written["section_id"], "sec-1");
    assert_eq!(written["digest"].as_str().unwrap().len(), 64);

    let response = app
        .oneshot(get_request("/sections/sec-1/content"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let loaded = body_json(response).await;
    assert_eq!(loaded["content"], content);
    assert_eq!(loaded["digest"], written["digest"]);
}

#[tokio::test]
async fn test_get_missing_section_is_404() {
    let (_dir, state) = test_state(vec![]).await;

    let response = router(state)
        .oneshot(get_request("/sections/nothing/content"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_percent_encoded_section_id() {
    let (_dir, state) = test_state(vec![]).await;
    let store = state.store.clone();

    let response = router(state)
        .oneshot(put_request(
            "/sections/notes%2Fintro/content",
            json!({ "content": "hi" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = store.get("notes/intro").await.unwrap().unwrap();
    assert_eq!(stored.content, json!("hi"));
}

#[tokio::test]
async fn test_sections_require_key_when_configured() {
    let (_dir, state) = test_state(vec![ApiKeyEntry {
        key: "secret".to_string(),
        client: "laptop".to_string(),
    }])
    .await;
    let app = router(state);

    let response = app
        .clone()
        .oneshot(put_request(
            "/sections/sec-1/content",
            json!({ "content": 1 }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "missing_auth");

    let response = app
        .clone()
        .oneshot(put_request(
            "/sections/sec-1/content",
            json!({ "content": 1 }),
            Some("wrong"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_key");

    let response = app
        .clone()
        .oneshot(put_request(
            "/sections/sec-1/content",
            json!({ "content": 1 }),
            Some("secret"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Health stays open
    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_content_field_is_rejected() {
    let (_dir, state) = test_state(vec![]).await;

    let response = router(state)
        .oneshot(put_request(
            "/sections/sec-1/content",
            json!({ "text": "no content key" }),
            None,
        ))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

async fn wait_for_peers(hub: &CollabHub, document_id: &str, count: usize) {
    for _ in 0..100 {
        if hub.peer_count(document_id).await >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("peers never joined {}", document_id);
}

#[tokio::test]
async fn test_collab_relays_between_peers() {
    let (_dir, state) = test_state(vec![]).await;
    let hub = state.hub.clone();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let url = format!("ws://{}/collab/doc-1", addr);
    let (mut alice, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut bob, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    wait_for_peers(&hub, "doc-1", 2).await;

    alice
        .send(WsMessage::Text("update from alice".into()))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), bob.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(received.into_text().unwrap().as_str(), "update from alice");

    // The sender does not get its own frame back
    let echoed = tokio::time::timeout(Duration::from_millis(200), alice.next()).await;
    assert!(echoed.is_err());
}

#[tokio::test]
async fn test_collab_channel_pruned_after_disconnect() {
    let (_dir, state) = test_state(vec![]).await;
    let hub = state.hub.clone();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let url = format!("ws://{}/collab/doc-2", addr);
    let (mut peer, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    wait_for_peers(&hub, "doc-2", 1).await;

    peer.close(None).await.unwrap();

    for _ in 0..100 {
        if hub.active_documents().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("collab channel was not pruned");
}
