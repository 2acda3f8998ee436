//! Psychologist account management (superadmin only).

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::db::{
    CreatePsychologistRequest, UpdatePsychologistRequest, UserProfile, UserResponse, UserRole,
    WriteOutcome,
};
use crate::AppState;

use super::auth::{create_account, hash_password, AuthUser};
use super::error::{ApiError, ValidationErrorBuilder};
use super::policy::{require, Action};
use super::response::{created, ok, ApiResult, CreatedResult};
use super::validation::{required_text, validate_email, validate_password_strength};

const NAME_MAX: usize = 120;

fn user_outcome(outcome: WriteOutcome<UserProfile>, action: &str) -> ApiResult<UserResponse> {
    match outcome {
        WriteOutcome::Committed(user) => ok(UserResponse::from(user)),
        WriteOutcome::NotFound => Err(ApiError::not_found("Psychologist not found")),
        WriteOutcome::Conflict => Err(ApiError::conflict(format!("Error {} psychologist", action))),
    }
}

/// Load a psychologist by id; superadmin accounts are not reachable here
async fn find(state: &AppState, id: &str) -> Result<UserProfile, ApiError> {
    match state.repos.users.get_by_id(id).await? {
        Some(user) if user.role == UserRole::Psychologist => Ok(user),
        _ => Err(ApiError::not_found("Psychologist not found")),
    }
}

pub async fn list_psychologists(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<UserResponse>> {
    require(&user, Action::ManageUsers)?;

    let mut psychologists = state.repos.users.list_by_role(UserRole::Psychologist).await?;
    psychologists.sort_by_key(|p| p.name.to_lowercase());
    ok(psychologists.into_iter().map(UserResponse::from).collect())
}

pub async fn get_psychologist(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<UserResponse> {
    require(&user, Action::ManageUsers)?;
    ok(UserResponse::from(find(&state, &id).await?))
}

pub async fn create_psychologist(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreatePsychologistRequest>, JsonRejection>,
) -> CreatedResult<UserResponse> {
    require(&user, Action::ManageUsers)?;
    let Json(req) = payload?;

    let email = req.email.unwrap_or_default();
    let password = req.password.unwrap_or_default();

    let mut errors = ValidationErrorBuilder::new();
    let name = match required_text(req.name.as_deref(), "Name", NAME_MAX) {
        Ok(name) => name,
        Err(e) => {
            errors.add("name", e);
            String::new()
        }
    };
    errors.check("email", validate_email(&email));
    errors.check("password", validate_password_strength(&password));
    errors.finish()?;

    if state.repos.users.get_by_email(&email).await?.is_some() {
        return Err(ApiError::validation_field(
            "email",
            "A user with this email already exists",
        ));
    }

    let outcome = create_account(&state.repos, &email, &name, &password, UserRole::Psychologist)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create psychologist");
            ApiError::internal("Internal server error")
        })?;

    match outcome {
        WriteOutcome::Committed(created_user) => {
            info!(email = %created_user.email, by = %user.email, "Psychologist created");
            created(UserResponse::from(created_user))
        }
        _ => Err(ApiError::validation_field(
            "email",
            "A user with this email already exists",
        )),
    }
}

pub async fn update_psychologist(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdatePsychologistRequest>, JsonRejection>,
) -> ApiResult<UserResponse> {
    require(&user, Action::ManageUsers)?;
    let Json(req) = payload?;
    find(&state, &id).await?;

    let mut errors = ValidationErrorBuilder::new();
    let name = match req.name.as_deref() {
        Some(name) => match required_text(Some(name), "Name", NAME_MAX) {
            Ok(name) => Some(name),
            Err(e) => {
                errors.add("name", e);
                None
            }
        },
        None => None,
    };
    let password_hash = match req.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => match validate_password_strength(password) {
            Ok(()) => Some(hash_password(password).map_err(|e| {
                tracing::error!(error = %e, "Failed to hash password");
                ApiError::internal("Internal server error")
            })?),
            Err(e) => {
                errors.add("password", e);
                None
            }
        },
        None => None,
    };
    errors.finish()?;

    let outcome = state
        .repos
        .users
        .modify(&id, |u| {
            if let Some(name) = name {
                u.name = name;
            }
            if let Some(hash) = password_hash {
                u.password_hash = hash;
            }
            if let Some(active) = req.is_active {
                u.is_active = active;
            }
        })
        .await?;
    user_outcome(outcome, "updating")
}

pub async fn delete_psychologist(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<UserResponse> {
    require(&user, Action::ManageUsers)?;
    find(&state, &id).await?;

    let outcome = state.repos.users.delete(&id).await?;
    if let WriteOutcome::Committed(deleted) = &outcome {
        info!(email = %deleted.email, by = %user.email, "Psychologist deleted");
    }
    user_outcome(outcome, "deleting")
}

/// POST /api/psychologists/:id/toggle-active
pub async fn toggle_active(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<UserResponse> {
    require(&user, Action::ManageUsers)?;
    find(&state, &id).await?;

    let outcome = state
        .repos
        .users
        .modify(&id, |u| u.is_active = !u.is_active)
        .await?;
    if let WriteOutcome::Committed(updated) = &outcome {
        info!(email = %updated.email, active = updated.is_active, "Psychologist active flag toggled");
    }
    user_outcome(outcome, "updating")
}
