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

fn config() -> Config {
    Config {
        port: 0,
        database_path: ":memory:".to_string(),
        ip_hash_salt: "test-salt".to_string(),
        unique_window_hours: 24,
        data_retention_days: 365,
        public_base_url: "https://qr.example.com".to_string(),
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

async fn request(
    app: &axum::Router,
    cookie: &str,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> axum::http::Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri).header("cookie", cookie);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).expect("build request"))
        .await
        .expect("request")
}

async fn create_link(app: &axum::Router, cookie: &str, body: Value) -> Value {
    let response = request(app, cookie, "POST", "/api/qrcodes", Some(body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn create_validates_destination_url() {
    let (_state, app, cookie) = setup().await;

    for bad in ["", "not-a-url", "ftp://example.com/x"] {
        let response = request(
            &app,
            &cookie,
            "POST",
            "/api/qrcodes",
            Some(json!({ "destination_url": bad })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "accepted '{bad}'");
    }
}

#[tokio::test]
async fn created_link_carries_tracking_url_and_slug() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(
        &app,
        &cookie,
        json!({ "destination_url": "https://example.com/a", "name": "A" }),
    )
    .await;

    let slug = link["slug"].as_str().expect("slug");
    assert_eq!(slug.len(), 7);
    assert!(slug
        .chars()
        .all(|c| "23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz".contains(c)));
    assert_eq!(
        link["tracking_url"].as_str().expect("tracking url"),
        format!("https://qr.example.com/t/{slug}")
    );
    assert_eq!(link["status"], "active");
    assert_eq!(link["dynamic"], true);
    assert_eq!(link["total_scans"], 0);
}

#[tokio::test]
async fn create_with_goal_attaches_primary_goal() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(
        &app,
        &cookie,
        json!({
            "destination_url": "https://example.com/a",
            "goal_name": "purchase",
            "goal_target": "https://example.com/thanks",
        }),
    )
    .await;
    assert_eq!(link["goal_name"], "purchase");
    assert_eq!(link["goal_target"], "https://example.com/thanks");
}

#[tokio::test]
async fn patch_updates_only_present_fields() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(
        &app,
        &cookie,
        json!({
            "destination_url": "https://example.com/a",
            "name": "Before",
            "campaign": "spring",
        }),
    )
    .await;
    let id = link["id"].as_i64().expect("id");

    let response = request(
        &app,
        &cookie,
        "PATCH",
        &format!("/api/qrcodes/{id}"),
        Some(json!({ "name": "After", "status": "paused" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = json_body(response).await;
    assert_eq!(updated["name"], "After");
    assert_eq!(updated["status"], "paused");
    // Untouched field survives.
    assert_eq!(updated["campaign"], "spring");

    // Invalid destination on PATCH is rejected.
    let response = request(
        &app,
        &cookie,
        "PATCH",
        &format!("/api/qrcodes/{id}"),
        Some(json!({ "destination_url": "nope" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_goal_name_upserts_and_clears() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;
    let id = link["id"].as_i64().expect("id");

    let response = request(
        &app,
        &cookie,
        "PATCH",
        &format!("/api/qrcodes/{id}"),
        Some(json!({ "goal_name": "signup", "goal_target": "https://example.com/done" })),
    )
    .await;
    let body = json_body(response).await;
    assert_eq!(body["goal_name"], "signup");

    // Re-edit replaces in place.
    let response = request(
        &app,
        &cookie,
        "PATCH",
        &format!("/api/qrcodes/{id}"),
        Some(json!({ "goal_name": "upgrade" })),
    )
    .await;
    let body = json_body(response).await;
    assert_eq!(body["goal_name"], "upgrade");

    // Emptied goal_name deletes the primary goal.
    let response = request(
        &app,
        &cookie,
        "PATCH",
        &format!("/api/qrcodes/{id}"),
        Some(json!({ "goal_name": "" })),
    )
    .await;
    let body = json_body(response).await;
    assert_eq!(body["goal_name"], Value::Null);
}

#[tokio::test]
async fn history_records_create_and_update() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;
    let id = link["id"].as_i64().expect("id");

    request(
        &app,
        &cookie,
        "PATCH",
        &format!("/api/qrcodes/{id}"),
        Some(json!({ "name": "Renamed" })),
    )
    .await;

    let response = request(&app, &cookie, "GET", &format!("/api/qrcodes/{id}/history"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let entries = json_body(response).await;
    let actions: Vec<&str> = entries
        .as_array()
        .expect("array")
        .iter()
        .map(|e| e["action"].as_str().expect("action"))
        .collect();
    assert!(actions.contains(&"created"));
    assert!(actions.contains(&"updated"));
}

#[tokio::test]
async fn delete_removes_link_and_returns_404_after() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;
    let id = link["id"].as_i64().expect("id");

    let response = request(&app, &cookie, "DELETE", &format!("/api/qrcodes/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = request(&app, &cookie, "GET", &format!("/api/qrcodes/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = request(&app, &cookie, "DELETE", &format!("/api/qrcodes/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_filters_and_paginates() {
    let (_state, app, cookie) = setup().await;
    for i in 0..3 {
        create_link(
            &app,
            &cookie,
            json!({
                "destination_url": format!("https://example.com/{i}"),
                "name": format!("Poster {i}"),
                "campaign": "spring",
            }),
        )
        .await;
    }
    create_link(
        &app,
        &cookie,
        json!({ "destination_url": "https://example.com/other", "name": "Banner" }),
    )
    .await;

    let response = request(&app, &cookie, "GET", "/api/qrcodes?q=poster&per_page=2", None).await;
    let body = json_body(response).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["items"].as_array().expect("items").len(), 2);

    let response = request(&app, &cookie, "GET", "/api/qrcodes?campaign=spring", None).await;
    let body = json_body(response).await;
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn download_renders_png_and_svg() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;
    let id = link["id"].as_i64().expect("id");
    let slug = link["slug"].as_str().expect("slug").to_string();

    let response = request(
        &app,
        &cookie,
        "GET",
        &format!("/api/qrcodes/{id}/download?format=png&size=200"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").expect("type"),
        "image/png"
    );
    let disposition = response
        .headers()
        .get("content-disposition")
        .expect("disposition")
        .to_str()
        .expect("str")
        .to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains(&format!("QR_{slug}")));
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

    let response = request(
        &app,
        &cookie,
        "GET",
        &format!("/api/qrcodes/{id}/download?format=svg&preview=true"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").expect("type"),
        "image/svg+xml"
    );
    assert!(response
        .headers()
        .get("content-disposition")
        .expect("disposition")
        .to_str()
        .expect("str")
        .starts_with("inline"));
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let svg = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert!(svg.contains("viewBox=\"0 0 "));
    assert!(svg.contains("fill=\"white\""));
}

#[tokio::test]
async fn download_rejects_unknown_format() {
    let (_state, app, cookie) = setup().await;
    let link = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;
    let id = link["id"].as_i64().expect("id");

    let response = request(
        &app,
        &cookie,
        "GET",
        &format!("/api/qrcodes/{id}/download?format=pdf"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_action_deletes_and_updates() {
    let (_state, app, cookie) = setup().await;
    let a = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;
    let b = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/b" })).await;
    let ids = vec![a["id"].as_i64().expect("id"), b["id"].as_i64().expect("id")];

    let response = request(
        &app,
        &cookie,
        "POST",
        "/api/qrcodes/bulk_action",
        Some(json!({ "action": "update", "ids": ids, "data": { "campaign": "winter", "status": "paused" } })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["count"], 2);

    let response = request(
        &app,
        &cookie,
        "GET",
        &format!("/api/qrcodes/{}", ids[0]),
        None,
    )
    .await;
    let link = json_body(response).await;
    assert_eq!(link["campaign"], "winter");
    assert_eq!(link["status"], "paused");

    let response = request(
        &app,
        &cookie,
        "POST",
        "/api/qrcodes/bulk_action",
        Some(json!({ "action": "delete", "ids": ids })),
    )
    .await;
    let body = json_body(response).await;
    assert_eq!(body["count"], 2);

    let response = request(&app, &cookie, "GET", "/api/qrcodes", None).await;
    let body = json_body(response).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn bulk_zip_export_ships_one_file_per_link() {
    let (_state, app, cookie) = setup().await;
    let a = create_link(
        &app,
        &cookie,
        json!({ "destination_url": "https://example.com/a", "name": "First" }),
    )
    .await;
    let b = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/b" })).await;
    let ids = vec![a["id"].as_i64().expect("id"), b["id"].as_i64().expect("id")];

    let response = request(
        &app,
        &cookie,
        "POST",
        "/api/qrcodes/bulk_action",
        Some(json!({ "action": "download_zip", "ids": ids, "format": "png", "size": 128 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").expect("type"),
        "application/zip"
    );
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    // ZIP local-file magic.
    assert_eq!(&bytes[..4], b"PK\x03\x04");

    let reader = std::io::Cursor::new(bytes.to_vec());
    let mut archive = zip::ZipArchive::new(reader).expect("open zip");
    assert_eq!(archive.len(), 2);
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).expect("entry").name().to_string())
        .collect();
    assert!(names.iter().any(|n| n.ends_with(".png") && n.contains("First")));
}

#[tokio::test]
async fn bulk_action_validates_input() {
    let (_state, app, cookie) = setup().await;

    let response = request(
        &app,
        &cookie,
        "POST",
        "/api/qrcodes/bulk_action",
        Some(json!({ "action": "delete", "ids": [] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = request(
        &app,
        &cookie,
        "POST",
        "/api/qrcodes/bulk_action",
        Some(json!({ "action": "delete", "ids": [99999] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let a = create_link(&app, &cookie, json!({ "destination_url": "https://example.com/a" })).await;
    let response = request(
        &app,
        &cookie,
        "POST",
        "/api/qrcodes/bulk_action",
        Some(json!({ "action": "frobnicate", "ids": [a["id"]] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
