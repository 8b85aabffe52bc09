use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Session cookie name.
pub const SESSION_COOKIE: &str = "qrw_session";

/// Session lifetime in days.
pub const SESSION_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Encode a signed session token for the shared admin identity.
pub fn encode_session(secret: &str) -> Result<String> {
    let now = Utc::now();
    let exp = now + Duration::days(SESSION_DAYS);

    let claims = Claims {
        sub: "admin".to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow!("encode_session: {}", e))
}

/// Decode and validate a session token (signature + expiry).
pub fn decode_session(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| anyhow!("decode_session: {}", e))?;

    Ok(data.claims)
}

/// Pull the session token out of a Cookie header value.
pub fn token_from_cookie_header(cookie_header: &str) -> Option<String> {
    cookie_header
        .split(';')
        .find_map(|c| c.trim().strip_prefix(&format!("{SESSION_COOKIE}=")))
        .map(|t| t.to_string())
}
