use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use qrwizard_duckdb::backend::now_utc;

use crate::{error::AppError, state::AppState};

/// `GET /health` — liveness probe; pings the store.
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    state.db.ping().await.map_err(AppError::Internal)?;
    Ok(Json(json!({
        "status": "ok",
        "time": now_utc(),
    })))
}
