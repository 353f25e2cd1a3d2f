use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guest {
    pub id: String,
    pub booking_id: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub is_primary: bool,
    pub id_proof_type: Option<IdProofType>,
    pub id_proof_number: Option<String>,
    pub id_front_image: Option<String>,
    pub id_back_image: Option<String>,
    pub id_verified: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdProofType {
    Aadhaar,
    Passport,
    DrivingLicense,
    VoterId,
}

impl IdProofType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdProofType::Aadhaar => "aadhaar",
            IdProofType::Passport => "passport",
            IdProofType::DrivingLicense => "driving_license",
            IdProofType::VoterId => "voter_id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "aadhaar" => Some(IdProofType::Aadhaar),
            "passport" => Some(IdProofType::Passport),
            "driving_license" => Some(IdProofType::DrivingLicense),
            "voter_id" => Some(IdProofType::VoterId),
            _ => None,
        }
    }

    /// Display form used on compliance documents, e.g. "DRIVING LICENSE".
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }
}

/// Guest details as captured on the registration form, before any image
/// placement or persistence has happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestDraft {
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub is_primary: bool,
    #[serde(default)]
    pub id_proof_type: Option<IdProofType>,
    #[serde(default)]
    pub id_proof_number: Option<String>,
    #[serde(default)]
    pub id_front_image: Option<String>,
    #[serde(default)]
    pub id_back_image: Option<String>,
}

impl GuestDraft {
    pub fn primary() -> Self {
        Self {
            full_name: String::new(),
            phone: None,
            email: None,
            address: None,
            is_primary: true,
            id_proof_type: None,
            id_proof_number: None,
            id_front_image: None,
            id_back_image: None,
        }
    }

    pub fn companion() -> Self {
        Self {
            is_primary: false,
            ..Self::primary()
        }
    }
}
