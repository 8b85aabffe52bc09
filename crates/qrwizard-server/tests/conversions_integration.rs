use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use qrwizard_core::config::Config;
use qrwizard_duckdb::DuckDbBackend;
use qrwizard_server::app::build_app;
use qrwizard_server::auth::password::hash_password;
use qrwizard_server::geo::GeoResolver;
use qrwizard_server::state::AppState;

const TEST_PASSWORD: &str = "strong_password_123";
const DESKTOP_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn config() -> Config {
    Config {
        port: 0,
        database_path: ":memory:".to_string(),
        ip_hash_salt: "test-salt".to_string(),
        unique_window_hours: 24,
        data_retention_days: 365,
        public_base_url: "http://localhost:3000".to_string(),
        tracking_param: "qr_tid".to_string(),
        secret_key: "test-secret-key".to_string(),
        admin_password_hash: hash_password(TEST_PASSWORD, 4096).expect("hash"),
        geoip_db_path: String::new(),
    }
}

async fn setup() -> (Arc<AppState>, axum::Router, String) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, config(), GeoResolver::disabled()));
    let app = build_app(Arc::clone(&state));
    let cookie = login(&app).await;
    (state, app, cookie)
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

async fn login(app: &axum::Router) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/api/login")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "password": TEST_PASSWORD }).to_string()))
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    response
        .headers()
        .get("set-cookie")
        .expect("session cookie")
        .to_str()
        .expect("cookie str")
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string()
}

async fn post_json(
    app: &axum::Router,
    cookie: &str,
    uri: &str,
    body: Value,
) -> axum::http::Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("cookie", cookie)
        .body(Body::from(body.to_string()))
        .expect("build request");
    app.clone().oneshot(request).await.expect("request")
}

async fn create_link(app: &axum::Router, cookie: &str, body: Value) -> Value {
    let response = post_json(app, cookie, "/api/qrcodes", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn conversion_by_id_and_rate_in_summary() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;
    let slug = link["slug"].as_str().expect("slug");

    // One unique scan.
    let request = Request::builder()
        .method("GET")
        .uri(format!("/t/{slug}"))
        .header("user-agent", DESKTOP_UA)
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::FOUND);

    let response = post_json(
        &app,
        &cookie,
        "/api/conversions",
        json!({ "qr_code_id": link["id"], "event_name": "purchase" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let conversion = json_body(response).await;
    assert_eq!(conversion["event_name"], "purchase");
    assert_eq!(conversion["qr_code_id"], link["id"]);

    let request = Request::builder()
        .method("GET")
        .uri("/api/analytics/summary")
        .header("cookie", &cookie)
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    let summary = json_body(response).await;
    assert_eq!(summary["conversions"], 1);
    assert_eq!(summary["conversion_rate"], 100.0);
}

#[tokio::test]
async fn conversion_by_slug_works_and_bad_reference_is_400() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;

    let response = post_json(
        &app,
        &cookie,
        "/api/conversions",
        json!({ "slug": link["slug"], "event_name": "signup" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = post_json(&app, &cookie, "/api/conversions", json!({ "event_name": "x" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        &app,
        &cookie,
        "/api/conversions",
        json!({ "slug": "zzzzzzz" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        &app,
        &cookie,
        "/api/conversions",
        json!({ "qr_code_id": link["id"], "goal_id": 424242 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn goal_auto_match_by_url_prefix() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;

    let response = post_json(
        &app,
        &cookie,
        "/api/goals",
        json!({
            "name": "checkout",
            "qr_code_id": link["id"],
            "target_url": "https://example.com/thanks",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let goal = json_body(response).await;

    // current_url under the goal's prefix → auto-matched.
    let response = post_json(
        &app,
        &cookie,
        "/api/conversions",
        json!({
            "qr_code_id": link["id"],
            "current_url": "https://example.com/thanks?order=9",
        }),
    )
    .await;
    let conversion = json_body(response).await;
    assert_eq!(conversion["goal_id"], goal["id"]);

    // Unrelated current_url → no goal attached.
    let response = post_json(
        &app,
        &cookie,
        "/api/conversions",
        json!({
            "qr_code_id": link["id"],
            "current_url": "https://example.com/elsewhere",
        }),
    )
    .await;
    let conversion = json_body(response).await;
    assert_eq!(conversion["goal_id"], Value::Null);
}

#[tokio::test]
async fn explicit_goal_id_wins_over_url_match() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;

    let response = post_json(
        &app,
        &cookie,
        "/api/goals",
        json!({ "name": "by-url", "target_url": "https://example.com/thanks" }),
    )
    .await;
    let _url_goal = json_body(response).await;

    let response = post_json(
        &app,
        &cookie,
        "/api/goals",
        json!({ "name": "explicit" }),
    )
    .await;
    let explicit = json_body(response).await;

    let response = post_json(
        &app,
        &cookie,
        "/api/conversions",
        json!({
            "qr_code_id": link["id"],
            "goal_id": explicit["id"],
            "current_url": "https://example.com/thanks",
        }),
    )
    .await;
    let conversion = json_body(response).await;
    assert_eq!(conversion["goal_id"], explicit["id"]);
}

#[tokio::test]
async fn goal_validation() {
    let (_state, app, cookie) = setup().await;

    let response = post_json(&app, &cookie, "/api/goals", json!({ "name": "  " })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        &app,
        &cookie,
        "/api/goals",
        json!({ "name": "bad target", "target_url": "not-a-url" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        &app,
        &cookie,
        "/api/goals",
        json!({ "name": "orphan", "qr_code_id": 999999 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pixel_beacon_records_and_never_reveals_link_existence() {
    let (state, app, cookie) = setup().await;
    let link = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;
    let slug = link["slug"].as_str().expect("slug");

    // Valid slug: conversion recorded, pixel returned. No auth required.
    let request = Request::builder()
        .method("GET")
        .uri(format!("/goal.gif?slug={slug}&event_name=scan_landing"))
        .header("user-agent", DESKTOP_UA)
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").expect("type"),
        "image/gif"
    );
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    assert_eq!(&bytes[..6], b"GIF89a");

    // Invalid slug: identical pixel, nothing recorded.
    let request = Request::builder()
        .method("GET")
        .uri("/goal.gif?slug=zzzzzzz")
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let other = response.into_body().collect().await.expect("body").to_bytes();
    assert_eq!(bytes, other);

    let conn = state.db.conn_for_test().await;
    let (count, event_name): (i64, String) = conn
        .prepare("SELECT COUNT(*), MAX(event_name) FROM conversion_events")
        .expect("prepare")
        .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("row");
    assert_eq!(count, 1);
    assert_eq!(event_name, "scan_landing");
}
