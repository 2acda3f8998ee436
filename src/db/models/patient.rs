//! Patient records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub medical_history: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Build a new record with a generated id from a validated request.
    pub fn from_request(name: String, req: PatientRequest) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email: req.email,
            phone: req.phone,
            date_of_birth: req.date_of_birth,
            gender: req.gender,
            address: req.address,
            emergency_contact: req.emergency_contact,
            medical_history: req.medical_history,
            notes: req.notes,
            is_active: req.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive substring match over name, email and phone.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        let hit = |field: &Option<String>| {
            field
                .as_deref()
                .map(|v| v.to_lowercase().contains(&query))
                .unwrap_or(false)
        };
        self.name.to_lowercase().contains(&query) || hit(&self.email) || hit(&self.phone)
    }
}

/// Body for both create and partial update. Absent fields are left unchanged on update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub medical_history: Option<String>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientQuery {
    pub q: Option<String>,
}
