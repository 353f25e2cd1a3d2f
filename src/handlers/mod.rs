pub mod bookings;
pub mod dashboard;
pub mod export;
pub mod guests;
pub mod health;
pub mod rooms;

use axum::http::HeaderMap;

use crate::errors::AppError;

/// Bearer-token guard shared by every admin endpoint.
pub(crate) fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
