//! Patient API endpoints.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::db::{normalize_email, Patient, PatientQuery, PatientRequest, WriteOutcome};
use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::policy::{require, Action};
use super::response::{created, ok, ApiResult, CreatedResult};
use super::validation::{required_text, validate_optional_email, validate_phone};

const NAME_MAX: usize = 120;

/// Shared field checks. On create `name` is required; on update it is only
/// checked when present.
fn validate_request(req: &mut PatientRequest, creating: bool) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if creating || req.name.is_some() {
        match required_text(req.name.as_deref(), "Name", NAME_MAX) {
            Ok(name) => req.name = Some(name),
            Err(e) => {
                errors.add("name", e);
            }
        }
    }
    errors.check("email", validate_optional_email(&req.email));
    errors.check("phone", validate_phone(&req.phone));

    errors.finish()
}

/// List patients, optionally filtered by `?q=`, sorted by name
pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    query: Result<Query<PatientQuery>, QueryRejection>,
) -> ApiResult<Vec<Patient>> {
    let Query(query) = query?;
    let mut patients = state.repos.patients.get_all().await?;

    if let Some(q) = query.q.as_deref() {
        patients.retain(|p| p.matches(q));
    }
    patients.sort_by_key(|p| p.name.to_lowercase());

    ok(patients)
}

pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Patient> {
    let patient = state
        .repos
        .patients
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Patient not found"))?;
    ok(patient)
}

pub async fn create_patient(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<PatientRequest>, JsonRejection>,
) -> CreatedResult<Patient> {
    let Json(mut req) = payload?;
    validate_request(&mut req, true)?;

    let name = req.name.take().unwrap_or_default();
    let patient = Patient::from_request(name, req);

    match state.repos.patients.create(patient).await? {
        WriteOutcome::Committed(patient) => {
            info!(patient_id = %patient.id, by = %user.email, "Patient created");
            created(patient)
        }
        _ => Err(ApiError::conflict("Error creating patient")),
    }
}

pub async fn update_patient(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<PatientRequest>, JsonRejection>,
) -> ApiResult<Patient> {
    let Json(mut req) = payload?;
    validate_request(&mut req, false)?;

    match state.repos.patients.update(&id, req).await? {
        WriteOutcome::Committed(patient) => ok(patient),
        WriteOutcome::NotFound => Err(ApiError::not_found("Patient not found")),
        WriteOutcome::Conflict => Err(ApiError::conflict("Error updating patient")),
    }
}

pub async fn delete_patient(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Patient> {
    match state.repos.patients.delete(&id).await? {
        WriteOutcome::Committed(patient) => {
            info!(patient_id = %patient.id, by = %user.email, "Patient deleted");
            ok(patient)
        }
        WriteOutcome::NotFound => Err(ApiError::not_found("Patient not found")),
        WriteOutcome::Conflict => Err(ApiError::conflict("Error deleting patient")),
    }
}

/// Patients with at least one appointment booked with this psychologist
///
/// GET /api/patients/by-psychologist/:email
pub async fn patients_by_psychologist(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(email): Path<String>,
) -> ApiResult<Vec<Patient>> {
    let email = normalize_email(&email);
    require(&user, Action::ViewPsychologistData(&email))?;

    let names: HashSet<String> = state
        .repos
        .appointments
        .get_all()
        .await?
        .into_iter()
        .filter(|a| a.psychologist_email.eq_ignore_ascii_case(&email))
        .map(|a| a.patient_name.trim().to_lowercase())
        .collect();

    let mut patients: Vec<Patient> = state
        .repos
        .patients
        .get_all()
        .await?
        .into_iter()
        .filter(|p| names.contains(&p.name.trim().to_lowercase()))
        .collect();
    patients.sort_by_key(|p| p.name.to_lowercase());

    ok(patients)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_name() {
        let mut req = PatientRequest::default();
        let err = validate_request(&mut req, true).unwrap_err();
        assert_eq!(err.message(), "Name is required");
    }

    #[test]
    fn test_create_trims_name() {
        let mut req = PatientRequest {
            name: Some("  Ana Souza ".to_string()),
            ..Default::default()
        };
        validate_request(&mut req, true).unwrap();
        assert_eq!(req.name.as_deref(), Some("Ana Souza"));
    }

    #[test]
    fn test_update_allows_absent_name_but_not_blank() {
        let mut req = PatientRequest::default();
        assert!(validate_request(&mut req, false).is_ok());

        let mut req = PatientRequest {
            name: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(validate_request(&mut req, false).is_err());
    }

    #[test]
    fn test_invalid_contact_fields() {
        let mut req = PatientRequest {
            name: Some("Ana".to_string()),
            email: Some("nope".to_string()),
            phone: Some("call me".to_string()),
            ..Default::default()
        };
        let err = validate_request(&mut req, true).unwrap_err();
        assert!(err.message().contains("2 fields"));
    }
}
