use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::models::{Booking, BookingStatus, Guest, IdProofType};
use crate::services::booking::{self, BookingError, CreateBookingRequest};
use crate::services::checkout::{self, CheckoutError};
use crate::state::AppState;

const DISPLAY_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt(dt: &NaiveDateTime) -> String {
    dt.format(DISPLAY_FMT).to_string()
}

#[derive(Serialize)]
pub struct GuestResponse {
    id: String,
    full_name: String,
    phone: Option<String>,
    phone_number: Option<String>,
    email: Option<String>,
    address: Option<String>,
    is_primary: bool,
    id_proof_type: Option<IdProofType>,
    id_proof_number: Option<String>,
    id_verified: bool,
}

impl From<Guest> for GuestResponse {
    fn from(guest: Guest) -> Self {
        Self {
            id: guest.id,
            full_name: guest.full_name,
            phone: guest.phone,
            phone_number: guest.phone_number,
            email: guest.email,
            address: guest.address,
            is_primary: guest.is_primary,
            id_proof_type: guest.id_proof_type,
            id_proof_number: guest.id_proof_number,
            id_verified: guest.id_verified,
        }
    }
}

#[derive(Serialize)]
pub struct BookingResponse {
    id: String,
    room_id: String,
    room_number: Option<String>,
    check_in: String,
    expected_checkout: String,
    check_out: Option<String>,
    has_ac: bool,
    has_geyser: bool,
    base_price: i64,
    ac_charge: i64,
    geyser_charge: i64,
    total_amount: i64,
    advance_paid: i64,
    extra_charges: i64,
    status: BookingStatus,
    notes: Option<String>,
    guests: Vec<GuestResponse>,
}

impl BookingResponse {
    fn new(booking: Booking, room_number: Option<String>, guests: Vec<Guest>) -> Self {
        Self {
            id: booking.id,
            room_id: booking.room_id,
            room_number,
            check_in: fmt(&booking.check_in),
            expected_checkout: fmt(&booking.expected_checkout),
            check_out: booking.check_out.as_ref().map(fmt),
            has_ac: booking.has_ac,
            has_geyser: booking.has_geyser,
            base_price: booking.base_price,
            ac_charge: booking.ac_charge,
            geyser_charge: booking.geyser_charge,
            total_amount: booking.total_amount,
            advance_paid: booking.advance_paid,
            extra_charges: booking.extra_charges,
            status: booking.status,
            notes: booking.notes,
            guests: guests.into_iter().map(GuestResponse::from).collect(),
        }
    }
}

// GET /api/bookings?scope=all|active|today
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub scope: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(100);
    let db = state.db.lock().unwrap();

    let bookings = match query.scope.as_deref() {
        Some("active") => queries::get_active_bookings(&db)?,
        Some("today") => {
            let now = Utc::now().naive_utc();
            let start = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);
            let end = now.date().and_hms_opt(23, 59, 59).unwrap_or(now);
            queries::get_bookings_checked_in_range(&db, &start, &end)?
        }
        _ => queries::get_all_bookings(&db, limit)?,
    };

    let mut response = Vec::with_capacity(bookings.len());
    for booking in bookings {
        let guests = queries::get_guests_for_booking(&db, &booking.id)?;
        let room_number = queries::get_room(&db, &booking.room_id)?.map(|r| r.room_number);
        response.push(BookingResponse::new(booking, room_number, guests));
    }
    Ok(Json(response))
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let created = booking::create_booking(&state, body)
        .await
        .map_err(booking_error)?;

    Ok(Json(BookingResponse::new(
        created.booking,
        Some(created.room_number),
        created.guests,
    )))
}

fn booking_error(err: BookingError) -> AppError {
    match err {
        BookingError::Invalid(e) => AppError::Validation(e.to_string()),
        BookingError::BadDeparture(raw) => {
            AppError::Validation(format!("invalid departure date: {raw}"))
        }
        BookingError::RoomNotFound(id) => AppError::NotFound(format!("room {id}")),
        BookingError::RoomUnavailable(number) => {
            AppError::Conflict(format!("Room {number} is no longer available"))
        }
        BookingError::Database(e) => AppError::Internal(e),
    }
}

// POST /api/bookings/:id/checkout
#[derive(Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub extra_charges: Option<i64>,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    booking: BookingResponse,
    balance_due: i64,
}

pub async fn checkout_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let summary = checkout::checkout(&state, &id, body.extra_charges.unwrap_or(0))
        .map_err(checkout_error)?;

    let guests = {
        let db = state.db.lock().unwrap();
        queries::get_guests_for_booking(&db, &summary.booking.id)?
    };

    Ok(Json(CheckoutResponse {
        balance_due: summary.balance_due,
        booking: BookingResponse::new(summary.booking, summary.room_number, guests),
    }))
}

fn checkout_error(err: CheckoutError) -> AppError {
    match err {
        CheckoutError::NotFound(id) => AppError::NotFound(format!("booking {id}")),
        CheckoutError::NotActive => AppError::Conflict("booking is not checked in".to_string()),
        CheckoutError::NegativeExtras => {
            AppError::Validation("extra charges cannot be negative".to_string())
        }
        CheckoutError::Database(e) => AppError::Internal(e),
    }
}
