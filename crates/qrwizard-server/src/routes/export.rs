use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::{error::AppError, state::AppState};

use super::analytics::AnalyticsQuery;

/// Sanitize a CSV field value against formula injection.
///
/// Spreadsheet apps interpret values beginning with `=`, `+`, `-`, `@`, TAB,
/// or CR as formula expressions; a leading single quote forces them to read
/// the value as a literal.
fn sanitize_csv_field(val: &str) -> Cow<'_, str> {
    if val.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        Cow::Owned(format!("'{val}"))
    } else {
        Cow::Borrowed(val)
    }
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

fn csv_response(filename: &str, bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// `GET /api/export/scans.csv` — flat scan export with the parent link's
/// facets, newest first, honoring the common analytics filters.
#[tracing::instrument(skip(state))]
pub async fn export_scans_csv(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AnalyticsQuery>,
) -> Result<Response, AppError> {
    let filter = super::analytics::filter_from_query(&q)?;
    let rows = state
        .db
        .export_scan_rows(&filter)
        .await
        .map_err(AppError::Internal)?;

    let mut wtr = csv::Writer::from_writer(Vec::with_capacity(rows.len().saturating_mul(128)));
    wtr.write_record([
        "scan_id",
        "scanned_at",
        "slug",
        "name",
        "campaign",
        "channel",
        "location",
        "owner",
        "country",
        "region",
        "city",
        "os",
        "browser",
        "device_type",
        "referrer",
        "is_bot",
        "is_unique",
        "is_duplicate",
    ])
    .map_err(|e| AppError::Internal(anyhow::anyhow!("csv write_record failed: {e}")))?;

    for row in &rows {
        wtr.write_record([
            row.scan_id.to_string().as_str(),
            &row.scanned_at,
            &sanitize_csv_field(&row.slug),
            &sanitize_csv_field(row.name.as_deref().unwrap_or("")),
            &sanitize_csv_field(row.campaign.as_deref().unwrap_or("")),
            &sanitize_csv_field(row.channel.as_deref().unwrap_or("")),
            &sanitize_csv_field(row.location.as_deref().unwrap_or("")),
            &sanitize_csv_field(row.owner.as_deref().unwrap_or("")),
            &sanitize_csv_field(row.country.as_deref().unwrap_or("")),
            &sanitize_csv_field(row.region.as_deref().unwrap_or("")),
            &sanitize_csv_field(row.city.as_deref().unwrap_or("")),
            &sanitize_csv_field(row.os.as_deref().unwrap_or("")),
            &sanitize_csv_field(row.browser.as_deref().unwrap_or("")),
            &sanitize_csv_field(row.device_type.as_deref().unwrap_or("")),
            &sanitize_csv_field(row.referrer.as_deref().unwrap_or("")),
            bool_str(row.is_bot),
            bool_str(row.is_unique),
            bool_str(row.is_duplicate),
        ])
        .map_err(|e| AppError::Internal(anyhow::anyhow!("csv write_record failed: {e}")))?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("csv finalize failed: {e}")))?;
    Ok(csv_response("scans_export.csv", bytes))
}

/// `GET /api/export/qrcodes.csv` — flat link export, newest first. A
/// re-import of this file recreates the same destinations (slugs mint
/// fresh).
#[tracing::instrument(skip(state))]
pub async fn export_links_csv(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let links = state.db.all_links().await.map_err(AppError::Internal)?;

    let mut wtr = csv::Writer::from_writer(Vec::with_capacity(links.len().saturating_mul(128)));
    wtr.write_record([
        "id",
        "slug",
        "name",
        "destination_url",
        "tracking_url",
        "campaign",
        "channel",
        "location",
        "asset",
        "owner",
        "status",
        "auto_append_utm",
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_term",
        "utm_content",
        "created_at",
        "updated_at",
    ])
    .map_err(|e| AppError::Internal(anyhow::anyhow!("csv write_record failed: {e}")))?;

    for link in &links {
        wtr.write_record([
            link.id.to_string().as_str(),
            &link.slug,
            &sanitize_csv_field(link.name.as_deref().unwrap_or("")),
            &link.destination_url,
            &state.config.tracking_url(&link.slug),
            &sanitize_csv_field(link.campaign.as_deref().unwrap_or("")),
            &sanitize_csv_field(link.channel.as_deref().unwrap_or("")),
            &sanitize_csv_field(link.location.as_deref().unwrap_or("")),
            &sanitize_csv_field(link.asset.as_deref().unwrap_or("")),
            &sanitize_csv_field(link.owner.as_deref().unwrap_or("")),
            link.status.as_str(),
            bool_str(link.auto_append_utm),
            &sanitize_csv_field(link.utm_source.as_deref().unwrap_or("")),
            &sanitize_csv_field(link.utm_medium.as_deref().unwrap_or("")),
            &sanitize_csv_field(link.utm_campaign.as_deref().unwrap_or("")),
            &sanitize_csv_field(link.utm_term.as_deref().unwrap_or("")),
            &sanitize_csv_field(link.utm_content.as_deref().unwrap_or("")),
            &link.created_at.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            &link.updated_at.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        ])
        .map_err(|e| AppError::Internal(anyhow::anyhow!("csv write_record failed: {e}")))?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("csv finalize failed: {e}")))?;
    Ok(csv_response("qrcodes_export.csv", bytes))
}
