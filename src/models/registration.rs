use chrono::NaiveDateTime;

use crate::models::{GuestDraft, IdProofType};

/// Client-side gate: the form is submittable once the completion score
/// reaches this value. The authoritative check is `validate()`, which runs
/// again server-side on every submission.
pub const SUBMIT_THRESHOLD: u8 = 85;

/// How the primary guest satisfies the statutory ID requirement.
///
/// `ReturningVerified` carries the image references captured on a prior
/// verified stay; the capture requirement is waived and those references are
/// reused. The other two variants require a full capture on this stay.
#[derive(Debug, Clone, PartialEq)]
pub enum IdRequirement {
    NewGuest,
    ReturningVerified {
        id_proof_type: Option<IdProofType>,
        id_front_image: String,
        id_back_image: String,
    },
    ReturningUnverified,
}

impl IdRequirement {
    pub fn waived(&self) -> bool {
        matches!(self, IdRequirement::ReturningVerified { .. })
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistrationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("a booking needs at least one guest")]
    NoGuests,
    #[error("exactly one primary guest is required")]
    PrimaryCount,
    #[error("advance amount cannot be negative")]
    NegativeAdvance,
    #[error("government ID proof (front and back) is mandatory for police verification")]
    IdProofIncomplete,
}

/// Immutable registration form state. Every transition goes through
/// `apply`, which consumes the current state and returns the next one, so
/// the progress score and submit gate are pure functions of a single value.
#[derive(Debug, Clone)]
pub struct RegistrationForm {
    pub room_id: String,
    pub expected_checkout: Option<NaiveDateTime>,
    pub has_ac: bool,
    pub has_geyser: bool,
    pub advance_paid: i64,
    pub notes: Option<String>,
    /// Index 0 is the primary guest.
    pub guests: Vec<GuestDraft>,
    pub id_requirement: IdRequirement,
}

#[derive(Debug, Clone)]
pub enum RegistrationEvent {
    PrimaryName(String),
    PrimaryPhone(String),
    Departure(NaiveDateTime),
    ProofType(IdProofType),
    ProofNumber(String),
    FrontImage(String),
    BackImage(String),
    ToggleAc(bool),
    ToggleGeyser(bool),
    Advance(i64),
    Notes(String),
    /// Outcome of the phone lookup: the requirement variant plus any
    /// name/phone prefill for the primary guest.
    LookupResolved(IdRequirement, Option<String>, Option<String>),
    AddCompanion(GuestDraft),
    RemoveCompanion(usize),
}

impl RegistrationForm {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            expected_checkout: None,
            has_ac: false,
            has_geyser: false,
            advance_paid: 0,
            notes: None,
            guests: vec![GuestDraft::primary()],
            id_requirement: IdRequirement::NewGuest,
        }
    }

    pub fn primary(&self) -> &GuestDraft {
        &self.guests[0]
    }

    pub fn apply(mut self, event: RegistrationEvent) -> Self {
        match event {
            RegistrationEvent::PrimaryName(name) => self.guests[0].full_name = name,
            RegistrationEvent::PrimaryPhone(phone) => self.guests[0].phone = Some(phone),
            RegistrationEvent::Departure(dt) => self.expected_checkout = Some(dt),
            RegistrationEvent::ProofType(t) => self.guests[0].id_proof_type = Some(t),
            RegistrationEvent::ProofNumber(n) => self.guests[0].id_proof_number = Some(n),
            RegistrationEvent::FrontImage(img) => self.guests[0].id_front_image = Some(img),
            RegistrationEvent::BackImage(img) => self.guests[0].id_back_image = Some(img),
            RegistrationEvent::ToggleAc(on) => self.has_ac = on,
            RegistrationEvent::ToggleGeyser(on) => self.has_geyser = on,
            RegistrationEvent::Advance(amount) => self.advance_paid = amount,
            RegistrationEvent::Notes(notes) => self.notes = Some(notes),
            RegistrationEvent::LookupResolved(requirement, name, phone) => {
                if let Some(name) = name {
                    if self.guests[0].full_name.trim().is_empty() {
                        self.guests[0].full_name = name;
                    }
                }
                if let Some(phone) = phone {
                    self.guests[0].phone = Some(phone);
                }
                self.id_requirement = requirement;
            }
            RegistrationEvent::AddCompanion(mut draft) => {
                draft.is_primary = false;
                self.guests.push(draft);
            }
            RegistrationEvent::RemoveCompanion(index) => {
                // The primary guest at index 0 cannot be removed.
                if index > 0 && index < self.guests.len() {
                    self.guests.remove(index);
                }
            }
        }
        self
    }

    /// Completion score 0-100. Name 20, phone 10, departure 15, ID block 55:
    /// a returning verified guest gets the whole block for free, otherwise
    /// it splits into proof type 15 + front 20 + back 20.
    pub fn progress(&self) -> u8 {
        let primary = self.primary();
        let mut score = 0u8;
        if !primary.full_name.trim().is_empty() {
            score += 20;
        }
        if primary.phone.as_deref().is_some_and(|p| !p.trim().is_empty()) {
            score += 10;
        }
        if self.expected_checkout.is_some() {
            score += 15;
        }
        if self.id_requirement.waived() {
            score += 55;
        } else {
            if primary.id_proof_type.is_some() {
                score += 15;
            }
            if primary.id_front_image.is_some() {
                score += 20;
            }
            if primary.id_back_image.is_some() {
                score += 20;
            }
        }
        score
    }

    pub fn can_submit(&self) -> bool {
        self.progress() >= SUBMIT_THRESHOLD
    }

    /// The hard gate. Runs independently of the progress score, both before
    /// submission client-side and again inside the booking workflow.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.guests.is_empty() {
            return Err(RegistrationError::NoGuests);
        }
        if self.guests.iter().filter(|g| g.is_primary).count() != 1 {
            return Err(RegistrationError::PrimaryCount);
        }
        let primary = self.primary();
        if primary.full_name.trim().len() < 2 {
            return Err(RegistrationError::Missing("guest name"));
        }
        if self.expected_checkout.is_none() {
            return Err(RegistrationError::Missing("departure date"));
        }
        if self.advance_paid < 0 {
            return Err(RegistrationError::NegativeAdvance);
        }
        if !self.id_requirement.waived() {
            if primary.id_proof_type.is_none() {
                return Err(RegistrationError::Missing("government ID type"));
            }
            if primary.id_front_image.is_none() || primary.id_back_image.is_none() {
                return Err(RegistrationError::IdProofIncomplete);
            }
        }
        Ok(())
    }
}
