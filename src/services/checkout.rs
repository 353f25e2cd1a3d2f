use chrono::Utc;

use crate::db::queries;
use crate::models::{Booking, BookingStatus, RoomStatus, RoomStatusEvent};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("booking not found: {0}")]
    NotFound(String),

    #[error("booking is not checked in")]
    NotActive,

    #[error("extra charges cannot be negative")]
    NegativeExtras,

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct CheckoutSummary {
    pub booking: Booking,
    pub room_number: Option<String>,
    /// total_amount - advance_paid; negative when the guest overpaid.
    /// Displayed to the desk, never enforced here.
    pub balance_due: i64,
}

/// Closes an active booking and sends the room to cleaning. The two writes
/// are sequential: if the room update fails after the booking update, the
/// booking stays checked out with the room still marked occupied and no
/// automatic repair is attempted.
pub fn checkout(
    state: &AppState,
    booking_id: &str,
    extra_charges: i64,
) -> Result<CheckoutSummary, CheckoutError> {
    if extra_charges < 0 {
        return Err(CheckoutError::NegativeExtras);
    }

    let now = Utc::now().naive_utc();
    let (summary, event) = {
        let db = state.db.lock().unwrap();

        let booking = queries::get_booking(&db, booking_id)?
            .ok_or_else(|| CheckoutError::NotFound(booking_id.to_string()))?;
        if booking.status != BookingStatus::CheckedIn {
            return Err(CheckoutError::NotActive);
        }

        queries::checkout_booking(&db, booking_id, &now, extra_charges)?;

        let room = queries::get_room(&db, &booking.room_id)?;
        queries::update_room_status(&db, &booking.room_id, RoomStatus::Cleaning)?;

        let updated = queries::get_booking(&db, booking_id)?
            .ok_or_else(|| CheckoutError::NotFound(booking_id.to_string()))?;
        let balance_due = updated.total_amount - updated.advance_paid;

        let event = room.as_ref().map(|r| RoomStatusEvent {
            room_id: r.id.clone(),
            room_number: r.room_number.clone(),
            status: RoomStatus::Cleaning,
        });

        (
            CheckoutSummary {
                booking: updated,
                room_number: room.map(|r| r.room_number),
                balance_due,
            },
            event,
        )
    };

    if let Some(event) = event {
        let _ = state.room_events_tx.send(event);
    }
    tracing::info!(
        booking_id,
        balance_due = summary.balance_due,
        extra_charges,
        "guest checked out, room sent to cleaning"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use tokio::sync::broadcast;

    use crate::config::AppConfig;
    use crate::db;
    use crate::models::{Room, RoomType};
    use crate::services::storage::ObjectStorage;

    struct NullStorage;

    #[async_trait]
    impl ObjectStorage for NullStorage {
        async fn upload(&self, path: &str, _: Vec<u8>, _: &str) -> anyhow::Result<String> {
            Ok(path.to_string())
        }

        async fn signed_url(&self, path: &str) -> anyhow::Result<String> {
            Ok(format!("https://example.com/{path}"))
        }

        async fn fetch(&self, _: &str) -> anyhow::Result<Vec<u8>> {
            Ok(vec![])
        }
    }

    fn test_state() -> AppState {
        let conn = db::init_db(":memory:").unwrap();
        let (tx, _) = broadcast::channel(16);
        AppState {
            db: Arc::new(Mutex::new(conn)),
            config: AppConfig::from_env(),
            storage: Box::new(NullStorage),
            lookup_cache: Mutex::new(HashMap::new()),
            room_events_tx: tx,
        }
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn seed_checked_in_booking(state: &AppState) {
        let now = Utc::now().naive_utc();
        let db = state.db.lock().unwrap();
        let room = Room {
            id: "room-101".to_string(),
            room_number: "101".to_string(),
            floor: 1,
            room_type: RoomType::Standard,
            base_price: 800,
            ac_charge: 300,
            geyser_charge: 100,
            status: RoomStatus::Occupied,
            description: None,
            created_at: now,
            updated_at: now,
        };
        queries::insert_room(&db, &room).unwrap();

        let booking = Booking {
            id: "bk-1".to_string(),
            room_id: "room-101".to_string(),
            check_in: dt("2026-08-06 12:00:00"),
            expected_checkout: dt("2026-08-07 10:00:00"),
            check_out: None,
            has_ac: true,
            has_geyser: false,
            base_price: 800,
            ac_charge: 300,
            geyser_charge: 0,
            total_amount: 1100,
            advance_paid: 500,
            extra_charges: 0,
            status: BookingStatus::CheckedIn,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        queries::insert_booking(&db, &booking).unwrap();
    }

    #[test]
    fn test_checkout_balance_and_transitions() {
        let state = test_state();
        seed_checked_in_booking(&state);

        let summary = checkout(&state, "bk-1", 0).unwrap();
        assert_eq!(summary.balance_due, 600);
        assert_eq!(summary.booking.status, BookingStatus::CheckedOut);
        assert!(summary.booking.check_out.is_some());

        let db = state.db.lock().unwrap();
        let room = queries::get_room(&db, "room-101").unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Cleaning);
    }

    #[test]
    fn test_checkout_records_extra_charges() {
        let state = test_state();
        seed_checked_in_booking(&state);

        let summary = checkout(&state, "bk-1", 250).unwrap();
        assert_eq!(summary.booking.extra_charges, 250);
        // The surfaced balance stays total - advance.
        assert_eq!(summary.balance_due, 600);
    }

    #[test]
    fn test_overpaid_balance_goes_negative() {
        let state = test_state();
        seed_checked_in_booking(&state);
        {
            let db = state.db.lock().unwrap();
            db.execute("UPDATE bookings SET advance_paid = 1500 WHERE id = 'bk-1'", [])
                .unwrap();
        }

        let summary = checkout(&state, "bk-1", 0).unwrap();
        assert_eq!(summary.balance_due, -400);
    }

    #[test]
    fn test_negative_extras_rejected() {
        let state = test_state();
        seed_checked_in_booking(&state);

        let err = checkout(&state, "bk-1", -50).unwrap_err();
        assert!(matches!(err, CheckoutError::NegativeExtras));
    }

    #[test]
    fn test_double_checkout_rejected() {
        let state = test_state();
        seed_checked_in_booking(&state);

        checkout(&state, "bk-1", 0).unwrap();
        let err = checkout(&state, "bk-1", 0).unwrap_err();
        assert!(matches!(err, CheckoutError::NotActive));
    }

    #[test]
    fn test_missing_booking_rejected() {
        let state = test_state();
        let err = checkout(&state, "missing", 0).unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound(_)));
    }
}
