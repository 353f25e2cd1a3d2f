use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::services::export::{self, ExportError, GuestStayRecord};
use crate::services::storage::DirectoryArchiveSink;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ExportSelection {
    pub start_date: String,
    pub end_date: String,
    pub booking_ids: Vec<String>,
    #[serde(default)]
    pub include_images: Option<bool>,
    #[serde(default)]
    pub password: Option<String>,
}

fn export_error(err: ExportError) -> AppError {
    match err {
        ExportError::MissingDocuments(count) => AppError::ExportIncomplete(count),
        ExportError::BadDate(raw) => AppError::Validation(format!("invalid date: {raw}")),
        ExportError::Internal(e) => AppError::Internal(e),
    }
}

fn collect(
    state: &AppState,
    body: &ExportSelection,
) -> Result<(Vec<GuestStayRecord>, chrono::NaiveDate, chrono::NaiveDate), AppError> {
    if body.booking_ids.is_empty() {
        return Err(AppError::Validation(
            "select at least one guest record to export".to_string(),
        ));
    }
    let start = export::parse_export_date(&body.start_date).map_err(export_error)?;
    let end = export::parse_export_date(&body.end_date).map_err(export_error)?;

    let records = {
        let db = state.db.lock().unwrap();
        export::collect_records(&db, start, end, &body.booking_ids).map_err(export_error)?
    };
    Ok((records, start, end))
}

fn text_document(content_type: &'static str, body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        body,
    )
        .into_response()
}

// POST /api/export/report — plain tabular document, no completeness gate
pub async fn export_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ExportSelection>,
) -> Result<Response, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let (records, start, end) = collect(&state, &body)?;

    let doc = export::render_summary_report(
        &records,
        start,
        end,
        &state.config.lodge_name,
        &state.config.lodge_address,
        &Utc::now().naive_utc(),
    );
    Ok(text_document("text/plain; charset=utf-8", doc))
}

// POST /api/export/register — narrative guest register, gated on complete IDs
pub async fn export_register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ExportSelection>,
) -> Result<Response, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let (records, start, end) = collect(&state, &body)?;

    let doc = export::render_guest_register(
        state.storage.as_ref(),
        &records,
        start,
        end,
        &state.config.lodge_name,
        &state.config.lodge_address,
        body.include_images.unwrap_or(true),
        &Utc::now().naive_utc(),
    )
    .await
    .map_err(export_error)?;
    Ok(text_document("text/plain; charset=utf-8", doc))
}

// POST /api/export/csv
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ExportSelection>,
) -> Result<Response, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let (records, _, _) = collect(&state, &body)?;

    let csv = export::render_csv(&records).map_err(export_error)?;
    Ok(text_document("text/csv; charset=utf-8", csv))
}

// POST /api/export/archive — per-room folders of ID images, gated
#[derive(Serialize)]
pub struct ArchiveResponse {
    entries: usize,
    skipped: usize,
    location: String,
}

pub async fn export_archive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ExportSelection>,
) -> Result<Json<ArchiveResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let (records, _, _) = collect(&state, &body)?;

    let staging = std::path::Path::new(&state.config.export_dir)
        .join(format!("id-proofs-{}", Uuid::new_v4()));
    let mut sink = DirectoryArchiveSink::new(staging);

    let summary = export::build_archive(
        state.storage.as_ref(),
        &mut sink,
        &records,
        body.password.as_deref(),
    )
    .await
    .map_err(export_error)?;

    tracing::info!(
        entries = summary.entries,
        skipped = summary.skipped,
        location = %summary.location,
        "ID image archive staged"
    );
    Ok(Json(ArchiveResponse {
        entries: summary.entries,
        skipped: summary.skipped,
        location: summary.location,
    }))
}
