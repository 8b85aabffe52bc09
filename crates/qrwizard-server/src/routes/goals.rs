use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use qrwizard_core::model::Goal;
use qrwizard_core::tracking::valid_http_url;
use qrwizard_duckdb::goals::GoalDraft;

use crate::{error::AppError, state::AppState};

use super::{pick_text, to_bool};

fn goal_json(goal: &Goal) -> Value {
    json!({
        "id": goal.id,
        "qr_code_id": goal.qr_code_id,
        "name": goal.name,
        "target_url": goal.target_url,
        "description": goal.description,
        "active": goal.active,
        "created_at": goal.created_at,
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateGoalRequest {
    pub name: Option<String>,
    pub qr_code_id: Option<i64>,
    pub target_url: Option<String>,
    pub description: Option<String>,
    pub active: Option<Value>,
}

/// `POST /api/goals` — create a standalone goal, optionally scoped to a
/// link (`qr_code_id = null` means global).
#[tracing::instrument(skip(state, payload))]
pub async fn create_goal(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateGoalRequest>,
) -> Result<Response, AppError> {
    let name = payload.name.as_deref().map(str::trim).unwrap_or("");
    if name.is_empty() {
        return Err(AppError::BadRequest("Goal name is required".to_string()));
    }

    if let Some(link_id) = payload.qr_code_id {
        super::links::require_link(&state, link_id).await?;
    }

    let target_url = payload
        .target_url
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    if let Some(target) = target_url.as_deref() {
        if !valid_http_url(target) {
            return Err(AppError::BadRequest(
                "target_url must be a valid http(s) URL".to_string(),
            ));
        }
    }

    let goal = state
        .db
        .create_goal(&GoalDraft {
            qr_code_id: payload.qr_code_id,
            name: pick_text(Some(name), 255).unwrap_or_default(),
            target_url,
            description: payload.description.clone(),
            active: to_bool(payload.active.as_ref(), true),
        })
        .await
        .map_err(AppError::Internal)?;

    Ok((StatusCode::CREATED, Json(goal_json(&goal))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListGoalsQuery {
    pub qr_code_id: Option<i64>,
}

/// `GET /api/goals` — all goals, newest first, optionally scoped to a link.
#[tracing::instrument(skip(state))]
pub async fn list_goals(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListGoalsQuery>,
) -> Result<Json<Value>, AppError> {
    let goals = state
        .db
        .list_goals(q.qr_code_id)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(json!(goals.iter().map(goal_json).collect::<Vec<_>>())))
}
