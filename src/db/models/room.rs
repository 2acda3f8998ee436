//! Treatment rooms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rooms are identified by a single letter.
pub const ROOM_IDS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub room_type: Option<String>,
    pub capacity: Option<u32>,
    #[serde(default)]
    pub equipment: Vec<String>,
    pub is_available: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn from_request(id: String, name: String, req: RoomRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            room_type: req.room_type,
            capacity: req.capacity,
            equipment: req.equipment.unwrap_or_default(),
            is_available: req.is_available.unwrap_or(true),
            description: req.description,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    pub id: Option<String>,
    pub name: Option<String>,
    pub room_type: Option<String>,
    pub capacity: Option<u32>,
    pub equipment: Option<Vec<String>>,
    pub is_available: Option<bool>,
    pub description: Option<String>,
}
