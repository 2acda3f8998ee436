//! Appointment API endpoints.
//!
//! Psychologists only ever see and change appointments booked under their own
//! email; superadmins see everything. Every ownership decision goes through
//! [`super::policy`].

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::db::{
    normalize_email, Appointment, AppointmentPatch, AppointmentQuery, AppointmentRequest,
    AppointmentStatus, Repositories, UpdateStatusRequest, UserProfile, UserRole, WriteOutcome,
};
use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::policy::{require, Action};
use super::response::{created, ok, ApiResult, CreatedResult};
use super::validation::{
    parse_date, parse_status, required_text, validate_email, validate_time,
};

const PATIENT_NAME_MAX: usize = 120;
const NOTES_MAX: usize = 2000;

/// Validate a raw body into a patch. With `creating`, patient name, date and
/// time are required.
fn validate_request(req: AppointmentRequest, creating: bool) -> Result<AppointmentPatch, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let mut patch = AppointmentPatch::default();

    if creating || req.patient_name.is_some() {
        match required_text(req.patient_name.as_deref(), "Patient name", PATIENT_NAME_MAX) {
            Ok(name) => patch.patient_name = Some(name),
            Err(e) => {
                errors.add("patientName", e);
            }
        }
    }

    match req.appointment_date.as_deref() {
        Some(date) => match parse_date(date) {
            Ok(date) => patch.appointment_date = Some(date),
            Err(e) => {
                errors.add("appointmentDate", e);
            }
        },
        None if creating => {
            errors.add("appointmentDate", "Appointment date is required");
        }
        None => {}
    }

    match req.appointment_time.as_deref() {
        Some(time) => match validate_time(time) {
            Ok(()) => patch.appointment_time = Some(time.trim().to_string()),
            Err(e) => {
                errors.add("appointmentTime", e);
            }
        },
        None if creating => {
            errors.add("appointmentTime", "Appointment time is required");
        }
        None => {}
    }

    if let Some(status) = req.status.as_deref() {
        match parse_status(status) {
            Ok(status) => patch.status = Some(status),
            Err(e) => {
                errors.add("status", e);
            }
        }
    }

    if let Some(email) = req.psychologist_email.as_deref().filter(|e| !e.trim().is_empty()) {
        match validate_email(email) {
            Ok(()) => patch.psychologist_email = Some(normalize_email(email)),
            Err(e) => {
                errors.add("psychologistEmail", e);
            }
        }
    }

    if let Some(notes) = req.notes {
        if notes.chars().count() > NOTES_MAX {
            errors.add("notes", format!("Notes are too long (max {} characters)", NOTES_MAX));
        } else {
            patch.notes = Some(notes);
        }
    }
    patch.psychologist_name = req.psychologist_name.filter(|n| !n.trim().is_empty());

    errors.finish()?;
    Ok(patch)
}

/// Active psychologist account for `email`, or a validation error
async fn find_psychologist(repos: &Repositories, email: &str) -> Result<UserProfile, ApiError> {
    match repos.users.get_by_email(email).await? {
        Some(user) if user.role == UserRole::Psychologist && user.is_active => Ok(user),
        _ => Err(ApiError::validation_field(
            "psychologistEmail",
            "No active psychologist with this email",
        )),
    }
}

/// Decide who the appointment is booked with. Psychologists always book
/// under their own account.
async fn resolve_assignment(
    repos: &Repositories,
    user: &UserProfile,
    patch: &mut AppointmentPatch,
) -> Result<(), ApiError> {
    match user.role {
        UserRole::Psychologist => {
            if let Some(email) = patch.psychologist_email.as_deref() {
                require(user, Action::BookFor(email))?;
            }
            patch.psychologist_email = Some(user.email.clone());
            patch.psychologist_name = Some(user.name.clone());
        }
        UserRole::Superadmin => {
            if let Some(email) = patch.psychologist_email.clone() {
                let psychologist = find_psychologist(repos, &email).await?;
                patch.psychologist_name = Some(psychologist.name);
            }
        }
    }
    Ok(())
}

fn visible_to(user: &UserProfile, appointment: &Appointment) -> bool {
    require(user, Action::ViewAppointment(appointment)).is_ok()
}

/// List appointments visible to the caller, ordered by date then time
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    query: Result<Query<AppointmentQuery>, QueryRejection>,
) -> ApiResult<Vec<Appointment>> {
    let Query(query) = query?;
    let status = match query.status.as_deref() {
        Some(s) => Some(parse_status(s).map_err(|e| ApiError::validation_field("status", e))?),
        None => None,
    };

    let mut appointments: Vec<Appointment> = state
        .repos
        .appointments
        .get_all()
        .await?
        .into_iter()
        .filter(|a| visible_to(&user, a))
        .filter(|a| query.date.map_or(true, |d| a.appointment_date == d))
        .filter(|a| status.map_or(true, |s| a.status == s))
        .collect();

    appointments.sort_by(|a, b| {
        (a.appointment_date, &a.appointment_time).cmp(&(b.appointment_date, &b.appointment_time))
    });

    ok(appointments)
}

pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Appointment> {
    let appointment = state
        .repos
        .appointments
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
    require(&user, Action::ViewAppointment(&appointment))?;
    ok(appointment)
}

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<AppointmentRequest>, JsonRejection>,
) -> CreatedResult<Appointment> {
    let Json(req) = payload?;
    let mut patch = validate_request(req, true)?;

    if user.role == UserRole::Superadmin && patch.psychologist_email.is_none() {
        return Err(ApiError::validation_field(
            "psychologistEmail",
            "Psychologist email is required",
        ));
    }
    resolve_assignment(&state.repos, &user, &mut patch).await?;

    let now = Utc::now();
    let appointment = Appointment {
        id: Uuid::new_v4().to_string(),
        patient_name: patch.patient_name.unwrap_or_default(),
        psychologist_email: patch.psychologist_email.unwrap_or_default(),
        psychologist_name: patch.psychologist_name,
        appointment_date: patch.appointment_date.unwrap_or_else(|| now.date_naive()),
        appointment_time: patch.appointment_time.unwrap_or_default(),
        status: patch.status.unwrap_or_default(),
        notes: patch.notes,
        created_at: now,
        updated_at: now,
    };

    match state.repos.appointments.create(appointment).await? {
        WriteOutcome::Committed(appointment) => {
            info!(
                appointment_id = %appointment.id,
                psychologist = %appointment.psychologist_email,
                by = %user.email,
                "Appointment created"
            );
            created(appointment)
        }
        _ => Err(ApiError::conflict("Error creating appointment")),
    }
}

pub async fn update_appointment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<AppointmentRequest>, JsonRejection>,
) -> ApiResult<Appointment> {
    let Json(req) = payload?;

    let current = state
        .repos
        .appointments
        .get_entry(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
    require(&user, Action::ModifyAppointment(&current.value))?;

    let mut patch = validate_request(req, false)?;
    if patch.psychologist_email.is_some() {
        resolve_assignment(&state.repos, &user, &mut patch).await?;
    } else {
        patch.psychologist_name = None;
    }

    match state.repos.appointments.commit_update(current, patch).await? {
        WriteOutcome::Committed(appointment) => ok(appointment),
        WriteOutcome::NotFound => Err(ApiError::not_found("Appointment not found")),
        WriteOutcome::Conflict => Err(ApiError::conflict("Error updating appointment")),
    }
}

pub async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Appointment> {
    let current = state
        .repos
        .appointments
        .get_entry(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
    require(&user, Action::ModifyAppointment(&current.value))?;

    match state.repos.appointments.commit_delete(current).await? {
        WriteOutcome::Committed(appointment) => {
            info!(appointment_id = %appointment.id, by = %user.email, "Appointment deleted");
            ok(appointment)
        }
        WriteOutcome::NotFound => Err(ApiError::not_found("Appointment not found")),
        WriteOutcome::Conflict => Err(ApiError::conflict("Error deleting appointment")),
    }
}

/// Set the status label. Any status may follow any other.
///
/// PUT|PATCH /api/appointments/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> ApiResult<Appointment> {
    let Json(req) = payload?;

    let current = state
        .repos
        .appointments
        .get_entry(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;

    let status: AppointmentStatus = match req.status.as_deref() {
        Some(s) => parse_status(s).map_err(|e| ApiError::validation_field("status", e))?,
        None => return Err(ApiError::validation_field("status", "Status is required")),
    };

    require(&user, Action::ModifyAppointment(&current.value))?;

    let previous = current.value.status;
    match state
        .repos
        .appointments
        .commit_modify(current, |a| a.status = status)
        .await?
    {
        WriteOutcome::Committed(appointment) => {
            info!(
                appointment_id = %appointment.id,
                from = %previous,
                to = %status,
                by = %user.email,
                "Appointment status changed"
            );
            ok(appointment)
        }
        WriteOutcome::NotFound => Err(ApiError::not_found("Appointment not found")),
        WriteOutcome::Conflict => Err(ApiError::conflict("Error updating appointment")),
    }
}
