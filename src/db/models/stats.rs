//! Dashboard counters.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: usize,
    pub total_psychologists: usize,
    pub total_appointments: usize,
    pub total_patients: usize,
    pub total_rooms: usize,
    pub available_rooms: usize,
}
