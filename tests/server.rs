//! HTTP API contract, driven through the router without a socket.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{doc, help_site, test_config, InMemorySite, Resource};
use docsense::knowledge::KnowledgeBase;
use docsense::refresh::RefreshEvent;
use docsense::server::router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn app_for(site: InMemorySite) -> (Router, KnowledgeBase) {
    let kb = KnowledgeBase::open_with_fetcher(&test_config(), Arc::new(site))
        .await
        .unwrap();
    (router(kb.clone()), kb)
}

async fn app() -> (Router, KnowledgeBase) {
    app_for(help_site()).await
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = app().await;
    let (status, body) = call(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn query_returns_ranked_hits() {
    let (app, kb) = app().await;
    kb.scheduler.refresh_now().await.unwrap();

    let (status, body) = call(
        app,
        post_json("/query", json!({ "query": "add a judge", "k": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 1);
    assert_eq!(body["outcome"], "matched");
    assert_eq!(body["hits"][0]["path"][0], "Invite");
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let (app, _) = app().await;
    let (status, body) = call(app, post_json("/query", json!({ "query": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_query");
}

#[tokio::test]
async fn unknown_category_is_rejected() {
    let (app, _) = app().await;
    let (status, body) = call(
        app,
        post_json("/query", json!({ "query": "judge", "category": "refunds" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "unknown_category");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("refunds"));
}

#[tokio::test]
async fn refresh_is_accepted_then_coalesced() {
    let site = help_site().with(
        "https://docs.example.com/guide/setup",
        Resource::Slow(
            Duration::from_millis(200),
            doc("Setup", "<p>Connect wallet from the top right corner.</p>"),
        ),
    );
    let (app, kb) = app_for(site).await;
    let mut events = kb.scheduler.subscribe();
    let refresh = || Request::post("/refresh").body(Body::empty()).unwrap();

    let (status, body) = call(app.clone(), refresh()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");

    let (status, body) = call(app.clone(), refresh()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "already_in_progress");

    // Let the background cycle finish before checking status.
    while let Ok(event) = events.recv().await {
        if !matches!(event, RefreshEvent::Started) {
            break;
        }
    }
    let (_, status) = call(app, get("/status")).await;
    assert_eq!(status["version"], 1);
}

#[tokio::test]
async fn status_starts_on_empty_snapshot() {
    let (app, _) = app().await;
    let (status, body) = call(app, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
    assert_eq!(body["version"], 0);
    assert_eq!(body["chunks"], 0);
    assert!(body["last_failure"].is_null());
}

#[tokio::test]
async fn categories_lists_taxonomy() {
    let (app, _) = app().await;
    let (status, body) = call(app, get("/categories")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["setup", "judging", "invite", "billing"]);
}
