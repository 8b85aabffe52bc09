use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth, routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware, outer to inner:
///
/// 1. `TraceLayer` — structured request/response logging via `tracing`.
/// 2. `CorsLayer` — permissive; the pixel beacon and conversion endpoint are
///    called from third-party pages.
/// 3. `require_admin` — gates `/api/*` behind the shared session cookie; the
///    public surface (`/t/*`, `/goal.gif`, `/health`, login, auth_status)
///    bypasses it.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/t/{slug}", get(routes::redirect::tracked_redirect))
        .route("/goal.gif", get(routes::conversions::conversion_pixel))
        .route("/api/login", post(auth::handlers::login))
        .route("/api/logout", post(auth::handlers::logout))
        .route("/api/auth_status", get(auth::handlers::auth_status))
        .route(
            "/api/qrcodes",
            post(routes::links::create_link).get(routes::links::list_links),
        )
        .route("/api/qrcodes/bulk", post(routes::bulk::bulk_import))
        .route("/api/qrcodes/bulk_action", post(routes::bulk::bulk_action))
        .route(
            "/api/qrcodes/{id}",
            get(routes::links::get_link)
                .patch(routes::links::patch_link)
                .delete(routes::links::delete_link),
        )
        .route(
            "/api/qrcodes/{id}/download",
            get(routes::links::download_link_image),
        )
        .route("/api/qrcodes/{id}/history", get(routes::links::link_history))
        .route(
            "/api/goals",
            post(routes::goals::create_goal).get(routes::goals::list_goals),
        )
        .route("/api/conversions", post(routes::conversions::create_conversion))
        .route("/api/analytics/summary", get(routes::analytics::summary))
        .route("/api/analytics/timeseries", get(routes::analytics::timeseries))
        .route("/api/analytics/top", get(routes::analytics::top))
        .route("/api/analytics/breakdown", get(routes::analytics::breakdown))
        .route("/api/analytics/options", get(routes::analytics::options))
        .route("/api/library/stats", get(routes::analytics::library_stats))
        .route("/api/export/scans.csv", get(routes::export::export_scans_csv))
        .route("/api/export/qrcodes.csv", get(routes::export::export_links_csv))
        .route("/api/retention/run", post(routes::retention::run_retention))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::middleware::require_admin,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
