use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries;
use crate::models::{
    Booking, BookingStatus, Guest, GuestDraft, IdProofType, IdRequirement, RegistrationError,
    RegistrationForm, RoomStatus, RoomStatusEvent,
};
use crate::services::identity;
use crate::services::storage::{data_url_to_bytes, ObjectStorage};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub room_id: String,
    pub expected_checkout: String,
    #[serde(default)]
    pub has_ac: bool,
    #[serde(default)]
    pub has_geyser: bool,
    #[serde(default)]
    pub advance_paid: i64,
    #[serde(default)]
    pub notes: Option<String>,
    pub guests: Vec<GuestDraft>,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error(transparent)]
    Invalid(#[from] RegistrationError),

    #[error("invalid departure date: {0}")]
    BadDeparture(String),

    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("Room {0} is no longer available")]
    RoomUnavailable(String),

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub guests: Vec<Guest>,
    pub room_number: String,
}

struct PlacedGuest {
    id: String,
    draft: GuestDraft,
    id_proof_type: Option<IdProofType>,
    id_front_image: Option<String>,
    id_back_image: Option<String>,
}

/// Runs the full walk-in registration: server-side ID gate, image placement,
/// tariff computation, then booking + guests + room transition in a single
/// transaction so a partial failure can never leave the room falsely marked.
pub async fn create_booking(
    state: &AppState,
    req: CreateBookingRequest,
) -> Result<CreatedBooking, BookingError> {
    let expected_checkout = parse_departure(&req.expected_checkout)?;

    // Primary guest goes to slot 0 of the form.
    let mut guests = req.guests;
    if let Some(pos) = guests.iter().position(|g| g.is_primary) {
        guests.swap(0, pos);
    }

    // The resolver is consulted server-side rather than trusting a client
    // echo; a prior verified stay waives the capture requirement.
    let id_requirement = guests
        .first()
        .filter(|g| g.is_primary)
        .and_then(|g| g.phone.as_deref())
        .map(|phone| identity::id_requirement(&identity::lookup_guest(state, phone)))
        .unwrap_or(IdRequirement::NewGuest);

    let form = RegistrationForm {
        room_id: req.room_id,
        expected_checkout: Some(expected_checkout),
        has_ac: req.has_ac,
        has_geyser: req.has_geyser,
        advance_paid: req.advance_paid,
        notes: req.notes,
        guests,
        id_requirement,
    };
    form.validate()?;

    let correlation_id = Uuid::new_v4().to_string();

    // Image placement happens before the database transaction: uploads are
    // best-effort and must not hold the connection lock across awaits.
    let mut placed = Vec::with_capacity(form.guests.len());
    for (index, draft) in form.guests.iter().enumerate() {
        let guest_id = Uuid::new_v4().to_string();
        let reuse_prior =
            index == 0 && draft.id_front_image.is_none() && draft.id_back_image.is_none();

        let (front, back, proof_type) = match (&form.id_requirement, reuse_prior) {
            (
                IdRequirement::ReturningVerified {
                    id_proof_type,
                    id_front_image,
                    id_back_image,
                },
                true,
            ) => (
                Some(id_front_image.clone()),
                Some(id_back_image.clone()),
                draft.id_proof_type.or(*id_proof_type),
            ),
            _ => {
                let front = place_image(
                    state.storage.as_ref(),
                    &correlation_id,
                    &guest_id,
                    "front",
                    draft.id_front_image.clone(),
                )
                .await;
                let back = place_image(
                    state.storage.as_ref(),
                    &correlation_id,
                    &guest_id,
                    "back",
                    draft.id_back_image.clone(),
                )
                .await;
                (front, back, draft.id_proof_type)
            }
        };

        placed.push(PlacedGuest {
            id: guest_id,
            draft: draft.clone(),
            id_proof_type: proof_type,
            id_front_image: front,
            id_back_image: back,
        });
    }

    let now = Utc::now().naive_utc();
    let (created, event) = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction().map_err(anyhow::Error::from)?;

        let room = queries::get_room(&tx, &form.room_id)?
            .ok_or_else(|| BookingError::RoomNotFound(form.room_id.clone()))?;
        if room.status != RoomStatus::Available {
            return Err(BookingError::RoomUnavailable(room.room_number));
        }

        // Price components are read from the room at this moment, never
        // re-derived later.
        let ac_charge = if form.has_ac { room.ac_charge } else { 0 };
        let geyser_charge = if form.has_geyser { room.geyser_charge } else { 0 };
        let total_amount = room.base_price + ac_charge + geyser_charge;

        let booking = Booking {
            id: correlation_id,
            room_id: room.id.clone(),
            check_in: now,
            expected_checkout,
            check_out: None,
            has_ac: form.has_ac,
            has_geyser: form.has_geyser,
            base_price: room.base_price,
            ac_charge,
            geyser_charge,
            total_amount,
            advance_paid: form.advance_paid,
            extra_charges: 0,
            status: BookingStatus::CheckedIn,
            notes: form.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        queries::insert_booking(&tx, &booking)?;

        let mut stored_guests = Vec::with_capacity(placed.len());
        for guest in placed {
            let normalized = guest
                .draft
                .phone
                .as_deref()
                .map(identity::normalize_phone)
                .filter(|p| !p.is_empty());
            let id_verified = guest.id_front_image.is_some()
                && guest.id_back_image.is_some()
                && guest.id_proof_type.is_some();

            let record = Guest {
                id: guest.id,
                booking_id: booking.id.clone(),
                full_name: guest.draft.full_name,
                phone_number: normalized.or_else(|| guest.draft.phone.clone()),
                phone: guest.draft.phone,
                email: guest.draft.email,
                address: guest.draft.address,
                is_primary: guest.draft.is_primary,
                id_proof_type: guest.id_proof_type,
                id_proof_number: guest.draft.id_proof_number,
                id_front_image: guest.id_front_image,
                id_back_image: guest.id_back_image,
                id_verified,
                created_at: now,
            };
            queries::insert_guest(&tx, &record)?;
            stored_guests.push(record);
        }

        queries::update_room_status(&tx, &room.id, RoomStatus::Occupied)?;
        tx.commit().map_err(anyhow::Error::from)?;

        let event = RoomStatusEvent {
            room_id: room.id,
            room_number: room.room_number.clone(),
            status: RoomStatus::Occupied,
        };
        (
            CreatedBooking {
                booking,
                guests: stored_guests,
                room_number: room.room_number,
            },
            event,
        )
    };

    // The next lookup on these numbers must see this stay, not a cached miss.
    if let Ok(mut cache) = state.lookup_cache.lock() {
        for guest in &created.guests {
            if let Some(number) = &guest.phone_number {
                cache.remove(number);
            }
        }
    }

    let _ = state.room_events_tx.send(event);
    tracing::info!(
        booking_id = %created.booking.id,
        room = %created.room_number,
        total_amount = created.booking.total_amount,
        "booking created, guest checked in"
    );

    Ok(created)
}

fn parse_departure(raw: &str) -> Result<NaiveDateTime, BookingError> {
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(dt);
        }
    }
    Err(BookingError::BadDeparture(raw.to_string()))
}

/// Resolves a captured image into its stored reference. Inline `data:`
/// captures are uploaded under `{booking}/{guest}/{side}`; an upload failure
/// keeps the inline data as the reference instead of failing the booking.
async fn place_image(
    storage: &dyn ObjectStorage,
    booking_id: &str,
    guest_id: &str,
    side: &str,
    image: Option<String>,
) -> Option<String> {
    let value = image?;
    if !value.starts_with("data:") {
        // Already a stored reference from a prior stay.
        return Some(value);
    }

    let (bytes, content_type) = match data_url_to_bytes(&value) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!(error = %e, side, "unreadable inline image data, storing as-is");
            return Some(value);
        }
    };

    let ext = if content_type == "image/png" { "png" } else { "jpg" };
    let path = format!("{booking_id}/{guest_id}/{side}.{ext}");

    match storage.upload(&path, bytes, &content_type).await {
        Ok(stored) => Some(stored),
        Err(e) => {
            tracing::error!(error = %e, side, "ID image upload failed, falling back to inline data");
            Some(value)
        }
    }
}
