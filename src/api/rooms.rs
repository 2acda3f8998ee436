//! Room API endpoints. Reads are open to every signed-in user; changes need
//! [`Action::ManageRooms`].

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::db::{Room, RoomRequest, WriteOutcome};
use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::policy::{require, Action};
use super::response::{created, ok, ApiResult, CreatedResult};
use super::validation::{parse_room_id, required_text, validate_capacity};

const NAME_MAX: usize = 80;

fn validate_fields(req: &mut RoomRequest, creating: bool, errors: &mut ValidationErrorBuilder) {
    if creating || req.name.is_some() {
        match required_text(req.name.as_deref(), "Name", NAME_MAX) {
            Ok(name) => req.name = Some(name),
            Err(e) => {
                errors.add("name", e);
            }
        }
    }
    errors.check("capacity", validate_capacity(req.capacity));
}

fn room_outcome(outcome: WriteOutcome<Room>, action: &str) -> ApiResult<Room> {
    match outcome {
        WriteOutcome::Committed(room) => ok(room),
        WriteOutcome::NotFound => Err(ApiError::not_found("Room not found")),
        WriteOutcome::Conflict => Err(ApiError::conflict(format!("Error {} room", action))),
    }
}

/// List rooms ordered by id
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Vec<Room>> {
    // Keys are listed in order, and ids are single letters
    ok(state.repos.rooms.get_all().await?)
}

pub async fn get_room(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Room> {
    let room = state
        .repos
        .rooms
        .get_by_id(&id.to_uppercase())
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;
    ok(room)
}

pub async fn create_room(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> CreatedResult<Room> {
    require(&user, Action::ManageRooms)?;
    let Json(mut req) = payload?;

    let mut errors = ValidationErrorBuilder::new();
    let id = match parse_room_id(req.id.as_deref()) {
        Ok(id) => Some(id),
        Err(e) => {
            errors.add("id", e);
            None
        }
    };
    validate_fields(&mut req, true, &mut errors);
    errors.finish()?;

    let id = id.unwrap_or_default();
    if state.repos.rooms.get_by_id(&id).await?.is_some() {
        return Err(ApiError::validation_field(
            "id",
            format!("Room {} already exists", id),
        ));
    }

    let name = req.name.take().unwrap_or_default();
    match state.repos.rooms.create(Room::from_request(id, name, req)).await? {
        WriteOutcome::Committed(room) => {
            info!(room_id = %room.id, by = %user.email, "Room created");
            created(room)
        }
        // Lost the race against another create with the same id
        _ => Err(ApiError::validation_field("id", "Room already exists")),
    }
}

pub async fn update_room(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> ApiResult<Room> {
    require(&user, Action::ManageRooms)?;
    let Json(mut req) = payload?;

    let mut errors = ValidationErrorBuilder::new();
    validate_fields(&mut req, false, &mut errors);
    errors.finish()?;

    let outcome = state.repos.rooms.update(&id.to_uppercase(), req).await?;
    room_outcome(outcome, "updating")
}

pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Room> {
    require(&user, Action::ManageRooms)?;

    let outcome = state.repos.rooms.delete(&id.to_uppercase()).await?;
    if let WriteOutcome::Committed(room) = &outcome {
        info!(room_id = %room.id, by = %user.email, "Room deleted");
    }
    room_outcome(outcome, "deleting")
}

/// Flip `isAvailable`
///
/// POST /api/rooms/:id/toggle
pub async fn toggle_room(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Room> {
    require(&user, Action::ManageRooms)?;

    let outcome = state
        .repos
        .rooms
        .modify(&id.to_uppercase(), |room| room.is_available = !room.is_available)
        .await?;
    room_outcome(outcome, "updating")
}
