use axum::extract::State;
use std::sync::Arc;

use crate::db::{dashboard_stats, DashboardStats};
use crate::AppState;

use super::auth::AuthUser;
use super::response::{ok, ApiResult};

/// Collection counts for the dashboard. A failed read yields zeros, never an error.
///
/// GET /api/dashboard/stats
pub async fn get_stats(State(state): State<Arc<AppState>>, _user: AuthUser) -> ApiResult<DashboardStats> {
    ok(dashboard_stats(&state.repos).await)
}
