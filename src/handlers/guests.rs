use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::services::identity::{self, GuestLookupResult};
use crate::state::AppState;

// GET /api/guests/lookup?phone=
#[derive(Deserialize)]
pub struct LookupQuery {
    pub phone: Option<String>,
}

/// Returning-guest lookup for the registration form. Fired on every
/// keystroke/blur of the phone field, so failures never surface: they
/// degrade to a not-found result inside the resolver.
pub async fn lookup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LookupQuery>,
) -> Result<Json<GuestLookupResult>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let result = identity::lookup_guest(&state, query.phone.as_deref().unwrap_or(""));
    Ok(Json(result))
}

// GET /api/guests/id-image?path=
#[derive(Deserialize)]
pub struct IdImageQuery {
    pub path: String,
}

/// Time-limited signed URL for a stored ID image, used by the desk UI to
/// preview captured documents. References degraded to inline data at booking
/// time are returned as-is.
pub async fn id_image_url(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<IdImageQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if query.path.starts_with("data:") {
        return Ok(Json(serde_json::json!({"url": query.path})));
    }

    let url = state
        .storage
        .signed_url(&query.path)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;
    Ok(Json(serde_json::json!({"url": url})))
}
