use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, state::AppState};

use super::session::{decode_session, token_from_cookie_header};

/// Gate the admin API behind the shared session cookie.
///
/// Only `/api/*` paths are gated; the public surface (`/`, `/health`,
/// `/static/*`, `/t/*`, `/goal.gif`) passes straight through, as do
/// `/api/login` and `/api/auth_status` so a logged-out UI can bootstrap.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if !path.starts_with("/api/") || matches!(path, "/api/login" | "/api/auth_status") {
        return next.run(request).await;
    }

    if has_valid_session(&state, &request) {
        return next.run(request).await;
    }

    AppError::Unauthorized.into_response()
}

pub(crate) fn has_valid_session(state: &AppState, request: &Request) -> bool {
    request
        .headers()
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(token_from_cookie_header)
        .map(|token| decode_session(&token, &state.config.secret_key).is_ok())
        .unwrap_or(false)
}
