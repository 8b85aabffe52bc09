use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppError, state::AppState};

use super::middleware::has_valid_session;
use super::password::verify_password;
use super::session::{encode_session, SESSION_COOKIE, SESSION_DAYS};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

/// `POST /api/login` — verify the shared admin password and set the signed
/// session cookie.
#[tracing::instrument(skip(state, payload))]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    if payload.password.is_empty()
        || !verify_password(&payload.password, &state.config.admin_password_hash)
    {
        return Err(AppError::Unauthorized);
    }

    let token = encode_session(&state.config.secret_key)?;
    let cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_DAYS * 86_400
    );

    let mut response = Json(json!({ "success": true })).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        cookie.parse().map_err(|e| {
            AppError::Internal(anyhow::anyhow!("session cookie header: {e}"))
        })?,
    );
    Ok(response)
}

/// `POST /api/logout` — expire the session cookie.
pub async fn logout() -> Result<Response, AppError> {
    let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    let mut response = Json(json!({ "success": true })).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        cookie.parse().map_err(|e| {
            AppError::Internal(anyhow::anyhow!("session cookie header: {e}"))
        })?,
    );
    Ok(response)
}

/// `GET /api/auth_status` — report whether the caller holds a valid session.
/// Public, so a logged-out UI can decide whether to show the login screen.
pub async fn auth_status(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Json<serde_json::Value> {
    Json(json!({ "authenticated": has_valid_session(&state, &request) }))
}
