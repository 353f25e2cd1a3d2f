use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub room_number: String,
    pub floor: i64,
    pub room_type: RoomType,
    pub base_price: i64,
    pub ac_charge: i64,
    pub geyser_charge: i64,
    pub status: RoomStatus,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Available,
    Occupied,
    Cleaning,
    Maintenance,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Occupied => "occupied",
            RoomStatus::Cleaning => "cleaning",
            RoomStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "occupied" => RoomStatus::Occupied,
            "cleaning" => RoomStatus::Cleaning,
            "maintenance" => RoomStatus::Maintenance,
            _ => RoomStatus::Available,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Standard,
    Luxury,
    Penthouse,
    FunctionHall,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Standard => "standard",
            RoomType::Luxury => "luxury",
            RoomType::Penthouse => "penthouse",
            RoomType::FunctionHall => "function_hall",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "luxury" => RoomType::Luxury,
            "penthouse" => RoomType::Penthouse,
            "function_hall" => RoomType::FunctionHall,
            _ => RoomType::Standard,
        }
    }
}

/// Pushed on the dashboard event stream whenever a room changes status.
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatusEvent {
    pub room_id: String,
    pub room_number: String,
    pub status: RoomStatus,
}
