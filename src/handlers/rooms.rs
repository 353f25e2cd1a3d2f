use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::models::{Room, RoomStatus, RoomStatusEvent, RoomType};
use crate::state::AppState;

#[derive(Serialize)]
pub struct RoomResponse {
    id: String,
    room_number: String,
    floor: i64,
    room_type: RoomType,
    base_price: i64,
    ac_charge: i64,
    geyser_charge: i64,
    status: RoomStatus,
    description: Option<String>,
}

impl From<Room> for RoomResponse {
    fn from(room: Room) -> Self {
        Self {
            id: room.id,
            room_number: room.room_number,
            floor: room.floor,
            room_type: room.room_type,
            base_price: room.base_price,
            ac_charge: room.ac_charge,
            geyser_charge: room.geyser_charge,
            status: room.status,
            description: room.description,
        }
    }
}

// GET /api/rooms
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let rooms = {
        let db = state.db.lock().unwrap();
        queries::list_rooms(&db)?
    };

    Ok(Json(rooms.into_iter().map(RoomResponse::from).collect()))
}

// POST /api/rooms
#[derive(Deserialize)]
pub struct CreateRoomRequest {
    pub room_number: String,
    pub floor: i64,
    pub room_type: RoomType,
    pub base_price: i64,
    pub ac_charge: i64,
    pub geyser_charge: i64,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateRoomRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let room_number = body.room_number.trim().to_string();
    if room_number.is_empty() {
        return Err(AppError::Validation("room number is required".to_string()));
    }
    if body.base_price < 0 || body.ac_charge < 0 || body.geyser_charge < 0 {
        return Err(AppError::Validation("prices cannot be negative".to_string()));
    }

    let now = Utc::now().naive_utc();
    let room = Room {
        id: Uuid::new_v4().to_string(),
        room_number,
        floor: body.floor,
        room_type: body.room_type,
        base_price: body.base_price,
        ac_charge: body.ac_charge,
        geyser_charge: body.geyser_charge,
        status: RoomStatus::Available,
        description: body.description,
        created_at: now,
        updated_at: now,
    };

    {
        let db = state.db.lock().unwrap();
        if queries::get_room_by_number(&db, &room.room_number)?.is_some() {
            return Err(AppError::Conflict(format!(
                "room {} already exists",
                room.room_number
            )));
        }
        queries::insert_room(&db, &room)?;
    }

    tracing::info!(room = %room.room_number, floor = room.floor, "room created");
    Ok(Json(RoomResponse::from(room)))
}

// POST /api/rooms/:id/status
#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: RoomStatus,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    // Occupied is owned by the booking workflow; housekeeping only moves
    // rooms between available, cleaning and maintenance.
    if body.status == RoomStatus::Occupied {
        return Err(AppError::Validation(
            "occupied is set by the booking workflow, not manually".to_string(),
        ));
    }

    let room = {
        let db = state.db.lock().unwrap();
        let room = queries::get_room(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("room {id}")))?;
        queries::update_room_status(&db, &id, body.status)?;
        room
    };

    let _ = state.room_events_tx.send(RoomStatusEvent {
        room_id: room.id,
        room_number: room.room_number.clone(),
        status: body.status,
    });

    tracing::info!(room = %room.room_number, status = body.status.as_str(), "room status updated");
    Ok(Json(serde_json::json!({"ok": true})))
}

// POST /api/rooms/:id/pricing
#[derive(Deserialize)]
pub struct UpdatePricingRequest {
    pub base_price: i64,
    pub ac_charge: i64,
    pub geyser_charge: i64,
}

pub async fn update_pricing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdatePricingRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if body.base_price < 0 || body.ac_charge < 0 || body.geyser_charge < 0 {
        return Err(AppError::Validation("prices cannot be negative".to_string()));
    }

    let updated = {
        let db = state.db.lock().unwrap();
        queries::update_room_pricing(&db, &id, body.base_price, body.ac_charge, body.geyser_charge)?
    };

    if !updated {
        return Err(AppError::NotFound(format!("room {id}")));
    }
    Ok(Json(serde_json::json!({"ok": true})))
}
