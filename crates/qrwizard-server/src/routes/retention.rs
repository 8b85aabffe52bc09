use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct RetentionRequest {
    pub days: Option<u32>,
}

/// `POST /api/retention/run` — purge scans and conversions older than the
/// cutoff. Links, goals, and history are never purged.
#[tracing::instrument(skip(state, payload))]
pub async fn run_retention(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<RetentionRequest>>,
) -> Result<Json<Value>, AppError> {
    let days = payload
        .and_then(|Json(p)| p.days)
        .unwrap_or(state.config.data_retention_days);

    let result = state
        .db
        .purge_older_than(days)
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(json!({
        "retention_days": days,
        "deleted_scans": result.deleted_scans,
        "deleted_conversions": result.deleted_conversions,
    })))
}
