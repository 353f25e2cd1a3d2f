use chrono::{NaiveDateTime, Utc};
use serde::Serialize;

use crate::db::queries;
use crate::models::{IdProofType, IdRequirement};
use crate::state::AppState;

/// The lookup fires on every keystroke of the phone field, so hits are
/// cached briefly per normalized number.
const LOOKUP_CACHE_TTL_SECS: i64 = 30;

/// Point-in-time projection of a guest's prior stays, keyed by phone number.
/// Advisory only: the booking workflow decides whether to trust and reuse it.
#[derive(Debug, Clone, Serialize)]
pub struct GuestLookupResult {
    pub guest_exists: bool,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub id_verified: bool,
    pub id_proof_type: Option<IdProofType>,
    pub id_front_image: Option<String>,
    pub id_back_image: Option<String>,
    pub first_stay_at: Option<NaiveDateTime>,
    pub last_stay_at: Option<NaiveDateTime>,
}

impl GuestLookupResult {
    pub fn not_found() -> Self {
        Self {
            guest_exists: false,
            full_name: None,
            phone_number: None,
            id_verified: false,
            id_proof_type: None,
            id_front_image: None,
            id_back_image: None,
            first_stay_at: None,
            last_stay_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedLookup {
    pub fetched_at: NaiveDateTime,
    pub result: GuestLookupResult,
}

/// Strips spaces, dashes and parentheses. Idempotent.
pub fn normalize_phone(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect()
}

/// Looks up the most recent guest on a phone number. Never fails: an empty
/// number or any lookup error degrades to the not-found result, since the
/// lookup is an optimization rather than gating behavior.
pub fn lookup_guest(state: &AppState, phone: &str) -> GuestLookupResult {
    let normalized = normalize_phone(phone);
    if normalized.is_empty() {
        return GuestLookupResult::not_found();
    }

    let now = Utc::now().naive_utc();
    if let Ok(cache) = state.lookup_cache.lock() {
        if let Some(hit) = cache.get(&normalized) {
            if (now - hit.fetched_at).num_seconds() < LOOKUP_CACHE_TTL_SECS {
                return hit.result.clone();
            }
        }
    }

    let row = {
        let db = state.db.lock().unwrap();
        queries::lookup_guest_by_phone(&db, &normalized)
    };

    let result = match row {
        Ok(Some(row)) => GuestLookupResult {
            guest_exists: true,
            full_name: Some(row.full_name),
            phone_number: row.phone_number.or(Some(normalized.clone())),
            id_verified: row.id_verified,
            id_proof_type: row.id_proof_type,
            // Prior image references are only handed out once verified.
            id_front_image: if row.id_verified { row.id_front_image } else { None },
            id_back_image: if row.id_verified { row.id_back_image } else { None },
            first_stay_at: Some(row.first_stay_at),
            last_stay_at: Some(row.last_stay_at),
        },
        Ok(None) => GuestLookupResult::not_found(),
        Err(e) => {
            tracing::warn!(error = %e, phone = %normalized, "guest lookup failed, treating as not found");
            return GuestLookupResult::not_found();
        }
    };

    if let Ok(mut cache) = state.lookup_cache.lock() {
        cache.insert(
            normalized,
            CachedLookup {
                fetched_at: now,
                result: result.clone(),
            },
        );
    }

    result
}

/// Maps a lookup result onto the registration form's ID requirement.
pub fn id_requirement(lookup: &GuestLookupResult) -> IdRequirement {
    if !lookup.guest_exists {
        return IdRequirement::NewGuest;
    }
    match (&lookup.id_front_image, &lookup.id_back_image) {
        (Some(front), Some(back)) if lookup.id_verified => IdRequirement::ReturningVerified {
            id_proof_type: lookup.id_proof_type,
            id_front_image: front.clone(),
            id_back_image: back.clone(),
        },
        _ => IdRequirement::ReturningUnverified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::broadcast;

    use crate::config::AppConfig;
    use crate::db;
    use crate::models::Guest;
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

    fn seed_guest(state: &AppState, phone_number: &str, verified: bool) {
        let now = Utc::now().naive_utc();
        let guest = Guest {
            id: format!("g-{phone_number}-{verified}"),
            booking_id: "b-1".to_string(),
            full_name: "Asha Rao".to_string(),
            phone: Some(phone_number.to_string()),
            phone_number: Some(phone_number.to_string()),
            email: None,
            address: None,
            is_primary: true,
            id_proof_type: Some(IdProofType::Aadhaar),
            id_proof_number: Some("1234".to_string()),
            id_front_image: Some("path/a.jpg".to_string()),
            id_back_image: Some("path/b.jpg".to_string()),
            id_verified: verified,
            created_at: now,
        };
        let db = state.db.lock().unwrap();
        queries::insert_guest(&db, &guest).unwrap();
    }

    #[test]
    fn test_normalize_strips_formatting() {
        assert_eq!(normalize_phone("+91 98765-43210"), "+919876543210");
        assert_eq!(normalize_phone("(040) 234 5678"), "0402345678");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["+91 98765-43210", "(040) 234 5678", "", "   ", "98765 43210"] {
            let once = normalize_phone(raw);
            assert_eq!(normalize_phone(&once), once);
        }
    }

    #[test]
    fn test_empty_phone_is_not_found() {
        let state = test_state();
        let result = lookup_guest(&state, "   ");
        assert!(!result.guest_exists);
        assert!(!result.id_verified);
    }

    #[test]
    fn test_unknown_phone_is_not_found() {
        let state = test_state();
        let result = lookup_guest(&state, "9999999999");
        assert!(!result.guest_exists);
    }

    #[test]
    fn test_lookup_matches_formatted_input() {
        let state = test_state();
        seed_guest(&state, "9876543210", true);

        let result = lookup_guest(&state, "98765 432-10");
        assert!(result.guest_exists);
        assert_eq!(result.full_name.as_deref(), Some("Asha Rao"));
        assert!(result.id_verified);
        assert_eq!(result.id_front_image.as_deref(), Some("path/a.jpg"));
        assert_eq!(result.id_back_image.as_deref(), Some("path/b.jpg"));
    }

    #[test]
    fn test_unverified_guest_images_withheld() {
        let state = test_state();
        seed_guest(&state, "9000000000", false);

        let result = lookup_guest(&state, "9000000000");
        assert!(result.guest_exists);
        assert!(!result.id_verified);
        assert!(result.id_front_image.is_none());
        assert!(result.id_back_image.is_none());
    }

    #[test]
    fn test_lookup_error_degrades_to_not_found() {
        let state = test_state();
        {
            let db = state.db.lock().unwrap();
            db.execute_batch("DROP TABLE guests;").unwrap();
        }
        let result = lookup_guest(&state, "9876543210");
        assert!(!result.guest_exists);
    }

    #[test]
    fn test_result_is_cached_per_normalized_number() {
        let state = test_state();
        let miss = lookup_guest(&state, "9876543210");
        assert!(!miss.guest_exists);

        // A guest inserted after the first lookup stays invisible while the
        // cached not-found result is fresh.
        seed_guest(&state, "9876543210", true);
        let cached = lookup_guest(&state, "98765 43210");
        assert!(!cached.guest_exists);
    }

    #[test]
    fn test_id_requirement_variants() {
        let mut lookup = GuestLookupResult::not_found();
        assert_eq!(id_requirement(&lookup), IdRequirement::NewGuest);

        lookup.guest_exists = true;
        assert_eq!(id_requirement(&lookup), IdRequirement::ReturningUnverified);

        lookup.id_verified = true;
        lookup.id_proof_type = Some(IdProofType::Aadhaar);
        lookup.id_front_image = Some("path/a.jpg".to_string());
        lookup.id_back_image = Some("path/b.jpg".to_string());
        assert!(matches!(
            id_requirement(&lookup),
            IdRequirement::ReturningVerified { .. }
        ));
    }
}
