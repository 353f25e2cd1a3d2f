use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::db::queries::{self, DashboardStats};
use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::state::AppState;

// GET /api/dashboard/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DashboardStats>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now().naive_utc();
    let stats = {
        let db = state.db.lock().unwrap();
        queries::get_dashboard_stats(&db, &now)?
    };
    Ok(Json(stats))
}

// GET /api/dashboard/departures
#[derive(Serialize)]
pub struct DepartureResponse {
    booking_id: String,
    room_number: String,
    guest_name: Option<String>,
    checkout_due: String,
    is_overdue: bool,
}

pub async fn get_departures(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<DepartureResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now().naive_utc();
    let departures = {
        let db = state.db.lock().unwrap();
        queries::get_departures(&db)?
    };

    let response = departures
        .into_iter()
        .map(|d| DepartureResponse {
            booking_id: d.booking_id,
            room_number: d.room_number,
            guest_name: d.guest_name,
            checkout_due: d.expected_checkout.format("%Y-%m-%d %H:%M:%S").to_string(),
            is_overdue: d.expected_checkout < now,
        })
        .collect();
    Ok(Json(response))
}

// GET /api/dashboard/events — SSE stream of room status changes
#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Auth via query param (EventSource can't set headers).
    let token = query.token.as_deref().unwrap_or("");
    if token != state.config.admin_token {
        return Err(AppError::Unauthorized);
    }

    let rx = state.room_events_tx.subscribe();

    let live_stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().data(data).event("room_status")))
        }
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(_)) => None,
    });

    let keepalive_stream = tokio_stream::StreamExt::map(
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(Duration::from_secs(30))),
        |_| Ok(Event::default().comment("keepalive")),
    );

    let merged = StreamExt::merge(live_stream, keepalive_stream);

    Ok(Sse::new(merged))
}
