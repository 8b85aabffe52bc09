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

async fn setup() -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, config(), GeoResolver::disabled()));
    let app = build_app(Arc::clone(&state));
    (state, app)
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

async fn create_link(app: &axum::Router, cookie: &str, body: Value) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri("/api/qrcodes")
        .header("content-type", "application/json")
        .header("cookie", cookie)
        .body(Body::from(body.to_string()))
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

async fn scan(app: &axum::Router, slug: &str, ua: &str, ip: &str) -> axum::http::Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(format!("/t/{slug}"))
        .header("user-agent", ua)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .expect("build request");
    app.clone().oneshot(request).await.expect("request")
}

async fn summary(app: &axum::Router, cookie: &str) -> Value {
    let request = Request::builder()
        .method("GET")
        .uri("/api/analytics/summary")
        .header("cookie", cookie)
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

#[tokio::test]
async fn redirect_appends_utm_and_tracking_param() {
    let (_state, app) = setup().await;
    let cookie = login(&app).await;

    let link = create_link(
        &app,
        &cookie,
        json!({
            "destination_url": "https://example.com/landing",
            "auto_append_utm": true,
            "utm_source": "qr",
            "utm_medium": "poster",
            "utm_campaign": "launch",
        }),
    )
    .await;
    let slug = link["slug"].as_str().expect("slug");

    let response = scan(&app, slug, DESKTOP_UA, "203.0.113.9").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get("location")
        .expect("location")
        .to_str()
        .expect("str");
    assert_eq!(
        location,
        format!(
            "https://example.com/landing?utm_source=qr&utm_medium=poster&utm_campaign=launch&qr_tid={slug}"
        )
    );

    let kpis = summary(&app, &cookie).await;
    assert_eq!(kpis["total_scans"], 1);
    assert_eq!(kpis["unique_scans"], 1);
    assert_eq!(kpis["bot_scans"], 0);
}

#[tokio::test]
async fn redirect_never_overwrites_existing_params() {
    let (_state, app) = setup().await;
    let cookie = login(&app).await;

    let link = create_link(
        &app,
        &cookie,
        json!({
            "destination_url": "https://example.com/landing?utm_source=email&qr_tid=keepme",
            "auto_append_utm": true,
            "utm_source": "qr",
            "utm_medium": "poster",
        }),
    )
    .await;
    let slug = link["slug"].as_str().expect("slug");

    let response = scan(&app, slug, DESKTOP_UA, "203.0.113.9").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get("location")
        .expect("location")
        .to_str()
        .expect("str");
    assert!(location.contains("utm_source=email"));
    assert!(!location.contains("utm_source=qr"));
    assert!(location.contains("qr_tid=keepme"));
    assert!(!location.contains(&format!("qr_tid={slug}")));
    // Fields the destination lacked are still merged.
    assert!(location.contains("utm_medium=poster"));
}

#[tokio::test]
async fn bot_scan_is_classified_and_excluded_from_totals() {
    let (state, app) = setup().await;
    let cookie = login(&app).await;

    let link = create_link(
        &app,
        &cookie,
        json!({ "destination_url": "https://example.com/landing" }),
    )
    .await;
    let slug = link["slug"].as_str().expect("slug");

    let response = scan(&app, slug, "Googlebot/2.1 (+http://www.google.com/bot.html)", "203.0.113.9").await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let kpis = summary(&app, &cookie).await;
    assert_eq!(kpis["total_scans"], 0);
    assert_eq!(kpis["bot_scans"], 1);
    assert_eq!(kpis["unique_scans"], 0);

    // Bot scans are neither unique nor duplicate.
    let conn = state.db.conn_for_test().await;
    let (is_bot, is_unique, is_duplicate): (bool, bool, bool) = conn
        .prepare("SELECT is_bot, is_unique, is_duplicate FROM scan_events")
        .expect("prepare")
        .query_row([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .expect("row");
    assert!(is_bot);
    assert!(!is_unique);
    assert!(!is_duplicate);
}

#[tokio::test]
async fn second_scan_within_window_is_duplicate() {
    let (state, app) = setup().await;
    let cookie = login(&app).await;

    let link = create_link(
        &app,
        &cookie,
        json!({ "destination_url": "https://example.com/landing" }),
    )
    .await;
    let slug = link["slug"].as_str().expect("slug");

    scan(&app, slug, DESKTOP_UA, "203.0.113.9").await;
    scan(&app, slug, DESKTOP_UA, "203.0.113.9").await;

    let kpis = summary(&app, &cookie).await;
    assert_eq!(kpis["total_scans"], 2);
    assert_eq!(kpis["unique_scans"], 1);

    let conn = state.db.conn_for_test().await;
    let flags: Vec<(bool, bool)> = conn
        .prepare("SELECT is_unique, is_duplicate FROM scan_events ORDER BY id ASC")
        .expect("prepare")
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(flags, vec![(true, false), (false, true)]);
}

#[tokio::test]
async fn scans_from_same_network_share_a_fingerprint() {
    let (state, app) = setup().await;
    let cookie = login(&app).await;

    let link = create_link(
        &app,
        &cookie,
        json!({ "destination_url": "https://example.com/landing" }),
    )
    .await;
    let slug = link["slug"].as_str().expect("slug");

    // Two addresses in the same /24: the anonymized network hash matches, so
    // the second scan reads as a duplicate visit.
    scan(&app, slug, DESKTOP_UA, "203.0.113.9").await;
    scan(&app, slug, DESKTOP_UA, "203.0.113.200").await;

    let conn = state.db.conn_for_test().await;
    let distinct: i64 = conn
        .prepare("SELECT COUNT(DISTINCT visitor_fingerprint) FROM scan_events")
        .expect("prepare")
        .query_row([], |row| row.get(0))
        .expect("row");
    assert_eq!(distinct, 1);
}

#[tokio::test]
async fn expired_link_archives_and_returns_410() {
    let (_state, app) = setup().await;
    let cookie = login(&app).await;

    let link = create_link(
        &app,
        &cookie,
        json!({
            "destination_url": "https://example.com/expired",
            "expires_at": "2020-01-01T00:00:00Z",
        }),
    )
    .await;
    let slug = link["slug"].as_str().expect("slug");
    let id = link["id"].as_i64().expect("id");

    let response = scan(&app, slug, DESKTOP_UA, "203.0.113.9").await;
    assert_eq!(response.status(), StatusCode::GONE);
    let body = json_body(response).await;
    assert!(body["error"]["message"]
        .as_str()
        .expect("message")
        .contains("archived"));

    // The stored status flipped to archived.
    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/qrcodes/{id}"))
        .header("cookie", &cookie)
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    let body = json_body(response).await;
    assert_eq!(body["status"], "archived");
}

#[tokio::test]
async fn paused_link_returns_410_naming_the_status() {
    let (_state, app) = setup().await;
    let cookie = login(&app).await;

    let link = create_link(
        &app,
        &cookie,
        json!({ "destination_url": "https://example.com/p", "status": "paused" }),
    )
    .await;
    let slug = link["slug"].as_str().expect("slug");

    let response = scan(&app, slug, DESKTOP_UA, "203.0.113.9").await;
    assert_eq!(response.status(), StatusCode::GONE);
    let body = json_body(response).await;
    assert!(body["error"]["message"]
        .as_str()
        .expect("message")
        .contains("paused"));
}

#[tokio::test]
async fn unknown_slug_is_404() {
    let (_state, app) = setup().await;
    let response = scan(&app, "zzzzzzz", DESKTOP_UA, "203.0.113.9").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inbound_query_params_are_recorded() {
    let (state, app) = setup().await;
    let cookie = login(&app).await;

    let link = create_link(
        &app,
        &cookie,
        json!({ "destination_url": "https://example.com/q" }),
    )
    .await;
    let slug = link["slug"].as_str().expect("slug");

    let request = Request::builder()
        .method("GET")
        .uri(format!("/t/{slug}?src=flyer&src=booth&batch=7"))
        .header("user-agent", DESKTOP_UA)
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::FOUND);

    let conn = state.db.conn_for_test().await;
    let payload: String = conn
        .prepare("SELECT query_payload FROM scan_events")
        .expect("prepare")
        .query_row([], |row| row.get(0))
        .expect("row");
    let parsed: Value = serde_json::from_str(&payload).expect("json");
    assert_eq!(parsed["src"], json!(["flyer", "booth"]));
    assert_eq!(parsed["batch"], json!(["7"]));
}
