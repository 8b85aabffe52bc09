use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use qrwizard_core::model::{ImageFormat, LinkDraft, LinkStatus};
use qrwizard_core::tracking::valid_http_url;

use crate::{csv_import::parse_csv, error::AppError, qr, state::AppState};

use super::{parse_iso_datetime, pick_text, safe_file_stem, to_bool, to_bool_str};

const FACET_MAX_LEN: usize = 255;

fn field<'a>(row: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    row.get(key).map(String::as_str)
}

/// `POST /api/qrcodes/bulk` — CSV ingest. The request body is the raw CSV
/// content. Invalid-URL rows are reported with their 1-based line numbers;
/// empty rows are skipped silently; each created link gets a `created_bulk`
/// history entry.
#[tracing::instrument(skip(state, body))]
pub async fn bulk_import(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<Value>, AppError> {
    let parsed = parse_csv(&body).map_err(AppError::BadRequest)?;

    let mut created = Vec::new();
    let mut errors = Vec::new();

    for (line, row) in &parsed.rows {
        let destination = field(row, "destination_url")
            .or_else(|| field(row, "url"))
            .or_else(|| field(row, "link"))
            .or_else(|| field(row, "target"))
            .map(str::trim)
            .unwrap_or("");

        if !valid_http_url(destination) {
            if destination.is_empty() {
                continue;
            }
            errors.push(json!({
                "row": line,
                "error": format!("Invalid destination_url: '{destination}'"),
            }));
            continue;
        }

        let draft = LinkDraft {
            destination_url: destination.to_string(),
            name: pick_text(field(row, "name"), FACET_MAX_LEN),
            campaign: pick_text(field(row, "campaign"), FACET_MAX_LEN),
            channel: pick_text(field(row, "channel"), FACET_MAX_LEN),
            location: pick_text(field(row, "location"), FACET_MAX_LEN),
            asset: pick_text(field(row, "asset"), FACET_MAX_LEN),
            owner: pick_text(field(row, "owner"), FACET_MAX_LEN),
            notes: field(row, "notes").map(str::to_string),
            status: Some(LinkStatus::parse_lenient(field(row, "status"))),
            auto_append_utm: field(row, "auto_append_utm")
                .map(|v| to_bool_str(v, false))
                .unwrap_or(false),
            utm_source: pick_text(field(row, "utm_source"), FACET_MAX_LEN),
            utm_medium: pick_text(field(row, "utm_medium"), FACET_MAX_LEN),
            utm_campaign: pick_text(field(row, "utm_campaign"), FACET_MAX_LEN),
            utm_term: pick_text(field(row, "utm_term"), FACET_MAX_LEN),
            utm_content: pick_text(field(row, "utm_content"), FACET_MAX_LEN),
            expires_at: None,
        };

        // Store errors are recorded per-row instead of failing the batch.
        match state.db.create_link(&draft).await {
            Ok(link) => {
                let details = json!({ "row": line }).to_string();
                state
                    .db
                    .append_history(link.id, "created_bulk", Some(&details))
                    .await
                    .map_err(AppError::Internal)?;
                created.push(link);
            }
            Err(e) => {
                tracing::error!(line, error = %e, "bulk row insert failed");
                errors.push(json!({ "row": line, "error": "insert failed" }));
            }
        }
    }

    Ok(Json(json!({
        "created": created
            .iter()
            .map(|link| json!({
                "id": link.id,
                "slug": link.slug,
                "name": link.name,
                "destination_url": link.destination_url,
                "tracking_url": state.config.tracking_url(&link.slug),
            }))
            .collect::<Vec<_>>(),
        "created_ids": created.iter().map(|l| l.id).collect::<Vec<_>>(),
        "created_count": created.len(),
        "errors": errors,
    })))
}

/// `POST /api/qrcodes/bulk_action` — delete, update, or ZIP-export a set of
/// links by id.
#[tracing::instrument(skip(state, payload))]
pub async fn bulk_action(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Response, AppError> {
    let action = payload.get("action").and_then(Value::as_str).unwrap_or("");
    let ids: Vec<i64> = payload
        .get("ids")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();

    if ids.is_empty() {
        return Err(AppError::BadRequest("No IDs provided".to_string()));
    }
    let links = state.db.links_by_ids(&ids).await.map_err(AppError::Internal)?;
    if links.is_empty() {
        return Err(AppError::NotFound("No valid QR codes found".to_string()));
    }

    match action {
        "delete" => {
            let existing: Vec<i64> = links.iter().map(|l| l.id).collect();
            let count = state
                .db
                .delete_links(&existing)
                .await
                .map_err(AppError::Internal)?;
            Ok(Json(json!({ "success": true, "count": count })).into_response())
        }
        "update" => {
            let data = payload
                .get("data")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let mut count = 0;
            for link in links {
                let mut updated = link.clone();
                apply_bulk_update(&mut updated, &data)?;
                if !links_equal(&link, &updated) {
                    state
                        .db
                        .update_link(&updated)
                        .await
                        .map_err(AppError::Internal)?;
                    count += 1;
                }
            }
            Ok(Json(json!({ "success": true, "count": count })).into_response())
        }
        "download_zip" => {
            let format = ImageFormat::parse(
                payload.get("format").and_then(Value::as_str).unwrap_or("png"),
            )
            .map_err(AppError::BadRequest)?;
            let size_px = payload
                .get("size")
                .and_then(Value::as_u64)
                .map(|s| s as u32)
                .unwrap_or(qr::DEFAULT_SIZE_PX)
                .clamp(16, 4096);
            let bytes = build_zip(&state, &links, format, size_px)?;
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/zip".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!(
                            "attachment; filename=qrcodes_{}.zip",
                            format.extension()
                        ),
                    ),
                ],
                bytes,
            )
                .into_response())
        }
        _ => Err(AppError::BadRequest("Invalid action".to_string())),
    }
}

/// One QR image per link: `{slug}_{sanitised name}.{ext}`. A link whose
/// render fails is logged and skipped; the archive still ships.
fn build_zip(
    state: &AppState,
    links: &[qrwizard_core::model::Link],
    format: ImageFormat,
    size_px: u32,
) -> Result<Vec<u8>, AppError> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut archive = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for link in links {
            let data = state.config.tracking_url(&link.slug);
            let bytes = match qr::render(&data, format, size_px) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(slug = %link.slug, error = %e, "zip image render failed");
                    continue;
                }
            };
            let stem = safe_file_stem(link.name.as_deref());
            let filename = if stem.is_empty() {
                format!("{}.{}", link.slug, format.extension())
            } else {
                format!("{}_{}.{}", link.slug, stem, format.extension())
            };
            archive
                .start_file(filename, options)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("zip start_file: {e}")))?;
            archive
                .write_all(&bytes)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("zip write: {e}")))?;
        }
        archive
            .finish()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("zip finish: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// Bulk update touches only the fields the payload carries non-empty values
/// for, mirroring the single-link PATCH semantics for each.
fn apply_bulk_update(
    link: &mut qrwizard_core::model::Link,
    data: &serde_json::Map<String, Value>,
) -> Result<(), AppError> {
    for fieldname in ["campaign", "channel", "location", "owner"] {
        if let Some(value) = data.get(fieldname).and_then(Value::as_str) {
            if !value.trim().is_empty() {
                let picked = pick_text(Some(value), FACET_MAX_LEN);
                match fieldname {
                    "campaign" => link.campaign = picked,
                    "channel" => link.channel = picked,
                    "location" => link.location = picked,
                    "owner" => link.owner = picked,
                    _ => {}
                }
            }
        }
    }
    if let Some(value) = data.get("status").and_then(Value::as_str) {
        if !value.trim().is_empty() {
            link.status = LinkStatus::parse_lenient(Some(value));
        }
    }
    if let Some(value) = data.get("auto_append_utm") {
        if !value.is_null() {
            link.auto_append_utm = to_bool(Some(value), link.auto_append_utm);
        }
    }
    if let Some(value) = data.get("expires_at").and_then(Value::as_str) {
        if !value.trim().is_empty() {
            // An unparseable bulk expiry is skipped rather than failing the
            // whole batch.
            if let Some(parsed) = parse_iso_datetime(value) {
                link.expires_at = Some(parsed);
            }
        }
    }
    Ok(())
}

fn links_equal(a: &qrwizard_core::model::Link, b: &qrwizard_core::model::Link) -> bool {
    a.campaign == b.campaign
        && a.channel == b.channel
        && a.location == b.location
        && a.owner == b.owner
        && a.status == b.status
        && a.auto_append_utm == b.auto_append_utm
        && a.expires_at == b.expires_at
}
