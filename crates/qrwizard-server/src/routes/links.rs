use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use qrwizard_core::model::{ImageFormat, Link, LinkDraft, LinkStatus};
use qrwizard_core::tracking::valid_http_url;
use qrwizard_duckdb::links::LinkListQuery;

use crate::{error::AppError, qr, state::AppState};

use super::{parse_iso_datetime, pick_text, safe_file_stem, to_bool};

const FACET_MAX_LEN: usize = 255;

/// Serialize a link for API responses: the row itself plus `tracking_url`,
/// `total_scans`, and the active primary goal.
pub(crate) async fn link_payload(
    state: &AppState,
    link: &Link,
    scan_count: Option<i64>,
) -> Result<Value, AppError> {
    let goal = state
        .db
        .primary_goal(link.id, true)
        .await
        .map_err(AppError::Internal)?;

    let mut payload = serde_json::to_value(link)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize link: {e}")))?;
    let obj = payload
        .as_object_mut()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("link serialized to non-object")))?;
    obj.insert(
        "tracking_url".to_string(),
        json!(state.config.tracking_url(&link.slug)),
    );
    obj.insert("total_scans".to_string(), json!(scan_count.unwrap_or(0)));
    obj.insert(
        "goal_name".to_string(),
        json!(goal.as_ref().map(|g| g.name.clone())),
    );
    obj.insert(
        "goal_target".to_string(),
        json!(goal.as_ref().and_then(|g| g.target_url.clone())),
    );
    Ok(payload)
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub destination_url: Option<String>,
    pub name: Option<String>,
    pub campaign: Option<String>,
    pub channel: Option<String>,
    pub location: Option<String>,
    pub asset: Option<String>,
    pub owner: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub auto_append_utm: Option<Value>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub expires_at: Option<String>,
    pub goal_name: Option<String>,
    pub goal_target: Option<String>,
}

/// `POST /api/qrcodes` — create a link, optionally with its primary goal.
#[tracing::instrument(skip(state, payload))]
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<Response, AppError> {
    let destination_url = payload
        .destination_url
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .to_string();
    if !valid_http_url(&destination_url) {
        return Err(AppError::BadRequest(
            "Please provide a valid http(s) destination_url".to_string(),
        ));
    }

    let expires_at = match payload.expires_at.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_iso_datetime(raw).ok_or_else(|| {
            AppError::BadRequest("Invalid date format for expires_at".to_string())
        })?),
    };

    let draft = LinkDraft {
        destination_url,
        name: pick_text(payload.name.as_deref(), FACET_MAX_LEN),
        campaign: pick_text(payload.campaign.as_deref(), FACET_MAX_LEN),
        channel: pick_text(payload.channel.as_deref(), FACET_MAX_LEN),
        location: pick_text(payload.location.as_deref(), FACET_MAX_LEN),
        asset: pick_text(payload.asset.as_deref(), FACET_MAX_LEN),
        owner: pick_text(payload.owner.as_deref(), FACET_MAX_LEN),
        notes: payload.notes.clone(),
        status: Some(LinkStatus::parse_lenient(payload.status.as_deref())),
        auto_append_utm: to_bool(payload.auto_append_utm.as_ref(), false),
        utm_source: pick_text(payload.utm_source.as_deref(), FACET_MAX_LEN),
        utm_medium: pick_text(payload.utm_medium.as_deref(), FACET_MAX_LEN),
        utm_campaign: pick_text(payload.utm_campaign.as_deref(), FACET_MAX_LEN),
        utm_term: pick_text(payload.utm_term.as_deref(), FACET_MAX_LEN),
        utm_content: pick_text(payload.utm_content.as_deref(), FACET_MAX_LEN),
        expires_at,
    };

    let link = state.db.create_link(&draft).await.map_err(AppError::Internal)?;

    // Integrated primary-goal creation.
    let goal_name = payload.goal_name.as_deref().map(str::trim).unwrap_or("");
    if !goal_name.is_empty() {
        let goal_target = payload
            .goal_target
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        state
            .db
            .upsert_primary_goal(link.id, goal_name, goal_target)
            .await
            .map_err(AppError::Internal)?;
    }

    let details = json!({ "destination_url": link.destination_url }).to_string();
    state
        .db
        .append_history(link.id, "created", Some(&details))
        .await
        .map_err(AppError::Internal)?;

    let body = link_payload(&state, &link, None).await?;
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListLinksQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub campaign: Option<String>,
    pub channel: Option<String>,
    pub location: Option<String>,
    pub owner: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// `GET /api/qrcodes` — paginated listing with facet filters and search.
#[tracing::instrument(skip(state))]
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListLinksQuery>,
) -> Result<Json<Value>, AppError> {
    let page = q.page.unwrap_or(1).max(1);
    let per_page = q.per_page.unwrap_or(50).clamp(1, 200);

    let (rows, total) = state
        .db
        .list_links(&LinkListQuery {
            q: q.q.clone(),
            status: q.status.clone(),
            campaign: q.campaign.clone(),
            channel: q.channel.clone(),
            location: q.location.clone(),
            owner: q.owner.clone(),
            page,
            per_page,
        })
        .await
        .map_err(AppError::Internal)?;

    let mut items = Vec::with_capacity(rows.len());
    for (link, scans) in &rows {
        items.push(link_payload(&state, link, Some(*scans)).await?);
    }

    let pages = (total + per_page as i64 - 1) / per_page as i64;
    Ok(Json(json!({
        "items": items,
        "page": page,
        "per_page": per_page,
        "total": total,
        "pages": pages,
    })))
}

/// `GET /api/qrcodes/{id}`
#[tracing::instrument(skip(state))]
pub async fn get_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let link = require_link(&state, id).await?;
    Ok(Json(link_payload(&state, &link, None).await?))
}

/// `PATCH /api/qrcodes/{id}` — partial update. Only keys present in the
/// payload are touched, so the body is inspected as a raw JSON object.
#[tracing::instrument(skip(state, payload))]
pub async fn patch_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let mut link = require_link(&state, id).await?;
    let payload = payload
        .as_object()
        .cloned()
        .unwrap_or_else(Map::new);

    let mut changes = Map::new();

    for field in ["name", "campaign", "channel", "location", "asset", "owner"] {
        if let Some(value) = payload.get(field) {
            let new_value = pick_text(value.as_str(), FACET_MAX_LEN);
            set_facet(&mut link, field, new_value.clone());
            changes.insert(field.to_string(), json!(new_value));
        }
    }
    if let Some(value) = payload.get("notes") {
        link.notes = value.as_str().map(str::to_string);
        changes.insert("notes".to_string(), json!(link.notes));
    }

    if let Some(value) = payload.get("destination_url") {
        let destination = value.as_str().map(str::trim).unwrap_or("");
        if !valid_http_url(destination) {
            return Err(AppError::BadRequest("Invalid destination_url".to_string()));
        }
        link.destination_url = destination.to_string();
        changes.insert("destination_url".to_string(), json!(destination));
    }

    if let Some(value) = payload.get("expires_at") {
        link.expires_at = match value.as_str().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_iso_datetime(raw).ok_or_else(|| {
                AppError::BadRequest("Invalid date format for expires_at".to_string())
            })?),
        };
        changes.insert("expires_at".to_string(), json!(link.expires_at));
    }

    if let Some(value) = payload.get("status") {
        link.status = LinkStatus::parse_lenient(value.as_str());
        changes.insert("status".to_string(), json!(link.status.as_str()));
    }

    if let Some(value) = payload.get("auto_append_utm") {
        link.auto_append_utm = to_bool(Some(value), link.auto_append_utm);
        changes.insert("auto_append_utm".to_string(), json!(link.auto_append_utm));
    }

    for field in ["utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content"] {
        if let Some(value) = payload.get(field) {
            let new_value = pick_text(value.as_str(), FACET_MAX_LEN);
            set_utm(&mut link, field, new_value.clone());
            changes.insert(field.to_string(), json!(new_value));
        }
    }

    // Primary-goal management through the link edit path: a non-empty
    // goal_name upserts; an explicitly emptied goal_name deletes.
    if let Some(value) = payload.get("goal_name") {
        let goal_name = value.as_str().map(str::trim).unwrap_or("");
        if !goal_name.is_empty() {
            let goal_target = payload
                .get("goal_target")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty());
            state
                .db
                .upsert_primary_goal(link.id, goal_name, goal_target)
                .await
                .map_err(AppError::Internal)?;
            changes.insert("goal_updated".to_string(), json!(true));
        } else if state
            .db
            .delete_primary_goal(link.id)
            .await
            .map_err(AppError::Internal)?
        {
            changes.insert("goal_deleted".to_string(), json!(true));
        }
    }

    let link = state.db.update_link(&link).await.map_err(AppError::Internal)?;

    if !changes.is_empty() {
        let details = Value::Object(changes).to_string();
        state
            .db
            .append_history(link.id, "updated", Some(&details))
            .await
            .map_err(AppError::Internal)?;
    }

    Ok(Json(link_payload(&state, &link, None).await?))
}

/// `DELETE /api/qrcodes/{id}` — cascades to scans, conversions, goals, and
/// history.
#[tracing::instrument(skip(state))]
pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    if !state.db.delete_link(id).await.map_err(AppError::Internal)? {
        return Err(AppError::NotFound("QR Code not found".to_string()));
    }
    Ok(Json(json!({ "success": true })))
}

/// `GET /api/qrcodes/{id}/history` — the most recent 200 entries.
#[tracing::instrument(skip(state))]
pub async fn link_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    require_link(&state, id).await?;
    let entries = state
        .db
        .recent_history(id)
        .await
        .map_err(AppError::Internal)?;
    let rows: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "action": e.action,
                "details": e.details,
                "created_at": e.created_at,
            })
        })
        .collect();
    Ok(Json(json!(rows)))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub format: Option<String>,
    pub size: Option<u32>,
    pub preview: Option<String>,
}

/// `GET /api/qrcodes/{id}/download` — PNG or SVG of the tracking URL.
/// `preview=true` serves inline; everything else downloads as attachment.
#[tracing::instrument(skip(state))]
pub async fn download_link_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(q): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let link = require_link(&state, id).await?;

    let format = ImageFormat::parse(q.format.as_deref().unwrap_or("png"))
        .map_err(AppError::BadRequest)?;
    let size_px = q.size.unwrap_or(qr::DEFAULT_SIZE_PX).clamp(16, 4096);

    let data = state.config.tracking_url(&link.slug);
    let bytes = qr::render(&data, format, size_px).map_err(AppError::Internal)?;

    let stem = safe_file_stem(link.name.as_deref());
    let filename = if stem.is_empty() {
        format!("QR_{}.{}", link.slug, format.extension())
    } else {
        format!("QR_{}_{}.{}", link.slug, stem, format.extension())
    };

    let is_preview = q
        .preview
        .as_deref()
        .map(|p| super::to_bool_str(p, false))
        .unwrap_or(false);
    let disposition = if is_preview {
        format!("inline; filename={filename}")
    } else {
        format!("attachment; filename={filename}")
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.mime_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub(crate) async fn require_link(state: &AppState, id: i64) -> Result<Link, AppError> {
    state
        .db
        .get_link(id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("QR Code not found".to_string()))
}

fn set_facet(link: &mut Link, field: &str, value: Option<String>) {
    match field {
        "name" => link.name = value,
        "campaign" => link.campaign = value,
        "channel" => link.channel = value,
        "location" => link.location = value,
        "asset" => link.asset = value,
        "owner" => link.owner = value,
        _ => {}
    }
}

fn set_utm(link: &mut Link, field: &str, value: Option<String>) {
    match field {
        "utm_source" => link.utm_source = value,
        "utm_medium" => link.utm_medium = value,
        "utm_campaign" => link.utm_campaign = value,
        "utm_term" => link.utm_term = value,
        "utm_content" => link.utm_content = value,
        _ => {}
    }
}
