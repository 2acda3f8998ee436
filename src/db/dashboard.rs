//! Dashboard counters computed from full collection scans.

use tracing::error;

use super::models::{DashboardStats, UserRole};
use super::Repositories;
use crate::kv::KvError;

async fn collect_stats(repos: &Repositories) -> Result<DashboardStats, KvError> {
    let rooms = repos.rooms.get_all().await?;

    Ok(DashboardStats {
        total_users: repos.users.count().await?,
        total_psychologists: repos.users.count_by_role(UserRole::Psychologist).await?,
        total_appointments: repos.appointments.count().await?,
        total_patients: repos.patients.count().await?,
        total_rooms: rooms.len(),
        available_rooms: rooms.iter().filter(|r| r.is_available).count(),
    })
}

/// Compute the dashboard counters. A read failure is logged and yields all zeros.
pub async fn dashboard_stats(repos: &Repositories) -> DashboardStats {
    match collect_stats(repos).await {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "Failed to compute dashboard stats");
            DashboardStats::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Patient, PatientRequest, Room, RoomRequest, UserProfile};
    use crate::kv::{KvKey, KvStore, MemoryKv};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_counts() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let repos = Repositories::new(store);

        repos
            .users
            .create(UserProfile::new("admin@clinic.test", "Admin", UserRole::Superadmin, "h".into()))
            .await
            .unwrap();
        repos
            .users
            .create(UserProfile::new("psy@clinic.test", "Psy", UserRole::Psychologist, "h".into()))
            .await
            .unwrap();
        repos
            .patients
            .create(Patient::from_request("Ana".into(), PatientRequest::default()))
            .await
            .unwrap();
        repos
            .rooms
            .create(Room::from_request("A".into(), "A".into(), RoomRequest::default()))
            .await
            .unwrap();
        let closed = RoomRequest {
            is_available: Some(false),
            ..Default::default()
        };
        repos
            .rooms
            .create(Room::from_request("B".into(), "B".into(), closed))
            .await
            .unwrap();

        let stats = dashboard_stats(&repos).await;
        assert_eq!(
            stats,
            DashboardStats {
                total_users: 2,
                total_psychologists: 1,
                total_appointments: 0,
                total_patients: 1,
                total_rooms: 2,
                available_rooms: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_read_failure_yields_zeros() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        // A record that does not decode as a Room
        store
            .set(&KvKey::new(["rooms", "A"]), &serde_json::json!({"bogus": true}))
            .await
            .unwrap();
        let repos = Repositories::new(store);

        assert_eq!(dashboard_stats(&repos).await, DashboardStats::default());
    }
}
