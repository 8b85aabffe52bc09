use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use qrwizard_core::identity::{ip_hash, visitor_fingerprint};
use qrwizard_core::model::{LinkStatus, ScanDraft};
use qrwizard_core::tracking::build_redirect_url;
use qrwizard_duckdb::backend::now_utc;

use crate::{
    device::{is_bot_user_agent, parse_device},
    error::AppError,
    state::AppState,
};

use super::client_ip;

/// `GET /t/{slug}` — the public redirect hot path.
///
/// Resolves the slug, enforces status and expiry, records the scan
/// synchronously, and 302s to the composed destination. The redirect is the
/// primary obligation of this endpoint: a failed scan write is logged and
/// never turns into an error response.
#[tracing::instrument(skip(state, headers, query))]
pub async fn tracked_redirect(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    let mut link = state
        .db
        .get_link_by_slug(&slug)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("QR Code not found".to_string()))?;

    // The single automatic status transition: active → archived on expiry.
    if link.status == LinkStatus::Active {
        if let Some(expires_at) = link.expires_at {
            if expires_at < now_utc() {
                state
                    .db
                    .set_link_status(link.id, LinkStatus::Archived)
                    .await
                    .map_err(AppError::Internal)?;
                link.status = LinkStatus::Archived;
            }
        }
    }

    if link.status != LinkStatus::Active {
        return Err(AppError::Gone(format!(
            "This QR Code is currently {}.",
            link.status.as_str()
        )));
    }

    // Synchronous scan logging. Asynchronous logging lost events under some
    // deployment topologies and was reverted.
    if let Err(e) = log_scan(&state, link.id, &headers, query.as_deref()).await {
        tracing::error!(qr_code_id = link.id, error = %e, "scan logging failed");
    }

    let destination = build_redirect_url(&link, &state.config.tracking_param)
        .unwrap_or_else(|e| {
            tracing::error!(qr_code_id = link.id, error = %e, "redirect URL composition failed");
            link.destination_url.clone()
        });

    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, destination)],
    )
        .into_response())
}

/// Classify and persist one scan: hash the network, fingerprint the visitor,
/// detect bots, resolve the uniqueness window, and denormalize geo + device.
async fn log_scan(
    state: &AppState,
    qr_code_id: i64,
    headers: &HeaderMap,
    query: Option<&str>,
) -> anyhow::Result<()> {
    let raw_ip = client_ip(headers);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let referrer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let ip_h = raw_ip
        .as_deref()
        .and_then(|ip| ip_hash(&state.config.ip_hash_salt, ip));
    let fingerprint = visitor_fingerprint(ip_h.as_deref(), user_agent.as_deref());
    let bot = user_agent
        .as_deref()
        .map(is_bot_user_agent)
        .unwrap_or(false);

    // First non-bot scan per fingerprint inside the window counts unique;
    // any later one is a duplicate. Scans without a fingerprint are neither.
    let (is_unique, is_duplicate) = match (&fingerprint, bot) {
        (Some(fp), false) => {
            let window_start =
                now_utc() - chrono::Duration::hours(state.config.unique_window_hours as i64);
            let prior = state
                .db
                .has_recent_scan(qr_code_id, fp, &window_start)
                .await?;
            (!prior, prior)
        }
        _ => (false, false),
    };

    let geo = match raw_ip.as_deref() {
        Some(ip) => state.geo.resolve(ip),
        None => Default::default(),
    };
    let device = parse_device(user_agent.as_deref().unwrap_or(""));
    let query_payload = query.and_then(query_payload_json);

    state
        .db
        .record_scan(&ScanDraft {
            qr_code_id,
            ip_hash: ip_h,
            visitor_fingerprint: fingerprint,
            country: geo.country,
            region: geo.region,
            city: geo.city,
            os: device.os,
            browser: device.browser,
            device_type: Some(device.device_type),
            referrer,
            user_agent,
            is_bot: bot,
            is_unique,
            is_duplicate,
            query_payload,
        })
        .await?;
    Ok(())
}

/// The inbound query parameters as a JSON object of key → value list, so
/// multi-valued parameters survive.
fn query_payload_json(query: &str) -> Option<String> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        map.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    serde_json::to_string(&map).ok()
}
