use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use qrwizard_core::identity::{ip_hash, visitor_fingerprint};
use qrwizard_core::model::Link;
use qrwizard_duckdb::conversions::ConversionDraft;

use crate::{error::AppError, state::AppState};

use super::{client_ip, pick_text};

/// 1×1 transparent GIF served by the beacon.
const TRANSPARENT_GIF: &[u8] = &[
    71, 73, 70, 56, 57, 97, 1, 0, 1, 0, 128, 0, 0, 0, 0, 0, 255, 255, 255, 33, 249, 4, 1, 0, 0, 0,
    0, 44, 0, 0, 0, 0, 1, 0, 1, 0, 0, 2, 2, 68, 1, 0, 59,
];

#[derive(Debug, Deserialize)]
pub struct ConversionRequest {
    pub qr_code_id: Option<i64>,
    pub slug: Option<String>,
    pub goal_id: Option<i64>,
    pub scan_event_id: Option<i64>,
    pub event_name: Option<String>,
    pub value: Option<f64>,
    pub current_url: Option<String>,
}

/// `POST /api/conversions` — record an explicit conversion event.
///
/// Goal selection: an explicit `goal_id` wins; otherwise `current_url` is
/// prefix-matched against active goals scoped to this link or global. The
/// fingerprint is copied from the referenced scan when given, else
/// recomputed from the current request.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn create_conversion(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ConversionRequest>,
) -> Result<Response, AppError> {
    let link = resolve_link(&state, payload.qr_code_id, payload.slug.as_deref()).await?;

    let goal = match payload.goal_id {
        Some(goal_id) => Some(
            state
                .db
                .goal_by_id(goal_id)
                .await
                .map_err(AppError::Internal)?
                .ok_or_else(|| AppError::BadRequest("goal_id not found".to_string()))?,
        ),
        None => {
            let current_url = payload
                .current_url
                .as_deref()
                .map(str::trim)
                .unwrap_or("");
            if current_url.is_empty() {
                None
            } else {
                state
                    .db
                    .match_goal_by_url(link.id, current_url)
                    .await
                    .map_err(AppError::Internal)?
            }
        }
    };

    let fingerprint = match payload.scan_event_id {
        Some(scan_id) => {
            let scan = state
                .db
                .scan_by_id(scan_id)
                .await
                .map_err(AppError::Internal)?
                .ok_or_else(|| AppError::BadRequest("scan_event_id not found".to_string()))?;
            scan.visitor_fingerprint
        }
        None => request_fingerprint(&state, &headers),
    };

    let conversion = state
        .db
        .record_conversion(&ConversionDraft {
            qr_code_id: link.id,
            goal_id: goal.as_ref().map(|g| g.id),
            scan_event_id: payload.scan_event_id,
            event_name: pick_text(payload.event_name.as_deref(), 255),
            value: payload.value,
            visitor_fingerprint: fingerprint,
        })
        .await
        .map_err(AppError::Internal)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": conversion.id,
            "qr_code_id": conversion.qr_code_id,
            "goal_id": conversion.goal_id,
            "event_name": conversion.event_name,
            "value": conversion.value,
            "occurred_at": conversion.occurred_at,
        })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct PixelQuery {
    pub slug: Option<String>,
    pub event_name: Option<String>,
}

/// `GET /goal.gif` — cookieless conversion beacon.
///
/// The pixel is always returned, valid slug or not, so the beacon never
/// reveals whether a link exists. Recording failures are swallowed.
#[tracing::instrument(skip(state, headers))]
pub async fn conversion_pixel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<PixelQuery>,
) -> Response {
    if let Some(slug) = q.slug.as_deref().filter(|s| !s.is_empty()) {
        if let Err(e) = record_pixel_conversion(&state, &headers, slug, q.event_name.as_deref()).await
        {
            tracing::error!(slug, error = %e, "pixel conversion recording failed");
        }
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, max-age=0"),
        ],
        TRANSPARENT_GIF,
    )
        .into_response()
}

async fn record_pixel_conversion(
    state: &AppState,
    headers: &HeaderMap,
    slug: &str,
    event_name: Option<&str>,
) -> anyhow::Result<()> {
    let Some(link) = state.db.get_link_by_slug(slug).await? else {
        return Ok(());
    };
    state
        .db
        .record_conversion(&ConversionDraft {
            qr_code_id: link.id,
            event_name: Some(event_name.unwrap_or("goal").to_string()),
            visitor_fingerprint: request_fingerprint(state, headers),
            ..Default::default()
        })
        .await?;
    Ok(())
}

async fn resolve_link(
    state: &AppState,
    qr_code_id: Option<i64>,
    slug: Option<&str>,
) -> Result<Link, AppError> {
    let link = match (qr_code_id, slug.map(str::trim).filter(|s| !s.is_empty())) {
        (Some(id), _) => state.db.get_link(id).await.map_err(AppError::Internal)?,
        (None, Some(slug)) => state
            .db
            .get_link_by_slug(slug)
            .await
            .map_err(AppError::Internal)?,
        (None, None) => None,
    };
    link.ok_or_else(|| AppError::BadRequest("Provide a valid qr_code_id or slug".to_string()))
}

fn request_fingerprint(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let ip_h = client_ip(headers)
        .as_deref()
        .and_then(|ip| ip_hash(&state.config.ip_hash_salt, ip));
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    visitor_fingerprint(ip_h.as_deref(), user_agent)
}
