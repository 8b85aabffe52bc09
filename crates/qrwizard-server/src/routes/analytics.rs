use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use qrwizard_core::analytics::{BreakdownField, BreakdownRow, Granularity, ScanFilter};

use crate::{error::AppError, state::AppState};

use super::parse_iso_datetime;

/// Query parameters shared by every analytics endpoint, plus the
/// endpoint-specific extras (`granularity`, `field`, `limit`).
#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub campaign: Option<String>,
    pub channel: Option<String>,
    pub location: Option<String>,
    pub owner: Option<String>,
    pub status: Option<String>,
    pub qr_code_id: Option<i64>,
    pub granularity: Option<String>,
    pub field: Option<String>,
    pub limit: Option<u32>,
}

pub(crate) fn filter_from_query(q: &AnalyticsQuery) -> Result<ScanFilter, AppError> {
    let start = match q.start.as_deref() {
        Some(raw) => Some(parse_iso_datetime(raw).ok_or_else(|| {
            AppError::BadRequest("start must be an ISO timestamp".to_string())
        })?),
        None => None,
    };
    let end = match q.end.as_deref() {
        Some(raw) => Some(parse_iso_datetime(raw).ok_or_else(|| {
            AppError::BadRequest("end must be an ISO timestamp".to_string())
        })?),
        None => None,
    };
    Ok(ScanFilter {
        start,
        end,
        campaign: q.campaign.clone(),
        channel: q.channel.clone(),
        location: q.location.clone(),
        owner: q.owner.clone(),
        status: q.status.clone(),
        qr_code_id: q.qr_code_id,
    })
}

/// `GET /api/analytics/summary`
#[tracing::instrument(skip(state))]
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AnalyticsQuery>,
) -> Result<Json<Value>, AppError> {
    let filter = filter_from_query(&q)?;
    let summary = state
        .db
        .summary(&filter, state.config.unique_window_hours)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(json!(summary)))
}

/// `GET /api/analytics/timeseries`
#[tracing::instrument(skip(state))]
pub async fn timeseries(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AnalyticsQuery>,
) -> Result<Json<Value>, AppError> {
    let filter = filter_from_query(&q)?;
    let granularity = Granularity::parse(q.granularity.as_deref())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let series = state
        .db
        .timeseries(&filter, granularity)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(json!(series)))
}

/// `GET /api/analytics/top`
#[tracing::instrument(skip(state))]
pub async fn top(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AnalyticsQuery>,
) -> Result<Json<Value>, AppError> {
    let filter = filter_from_query(&q)?;
    let limit = q.limit.unwrap_or(10).clamp(1, 100);
    let links = state
        .db
        .top_links(&filter, limit)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(json!(links)))
}

/// `GET /api/analytics/breakdown` — group scans by one of the closed set of
/// dimensions; unknown fields fall back to campaign.
#[tracing::instrument(skip(state))]
pub async fn breakdown(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AnalyticsQuery>,
) -> Result<Json<Value>, AppError> {
    let filter = filter_from_query(&q)?;
    let field = BreakdownField::parse(q.field.as_deref());
    let limit = q.limit.unwrap_or(20).clamp(1, 100);

    let groups = state
        .db
        .breakdown(&filter, field, limit)
        .await
        .map_err(AppError::Internal)?;
    let rows: Vec<BreakdownRow> = groups
        .into_iter()
        .map(|(label, total_scans, unique_scans)| BreakdownRow {
            label: field.humanize_label(label),
            total_scans,
            unique_scans,
        })
        .collect();
    Ok(Json(json!(rows)))
}

/// `GET /api/analytics/options` — distinct facet values for filter pickers.
#[tracing::instrument(skip(state))]
pub async fn options(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let options = state.db.facet_options().await.map_err(AppError::Internal)?;
    Ok(Json(json!(options)))
}

/// `GET /api/library/stats` — link counts per status.
#[tracing::instrument(skip(state))]
pub async fn library_stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let counts = state.db.status_counts().await.map_err(AppError::Internal)?;
    Ok(Json(json!(counts)))
}
