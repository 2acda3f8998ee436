//! Success envelope shared by all JSON handlers.

use axum::{http::StatusCode, Json};
use serde::Serialize;

use super::error::ApiError;

/// `{"success": true, "data": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct Success<T> {
    success: bool,
    data: T,
}

impl<T: Serialize> Success<T> {
    pub fn of(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

pub type ApiResult<T> = Result<Json<Success<T>>, ApiError>;

pub type CreatedResult<T> = Result<(StatusCode, Json<Success<T>>), ApiError>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Success::of(data)))
}

pub fn created<T: Serialize>(data: T) -> CreatedResult<T> {
    Ok((StatusCode::CREATED, Json(Success::of(data))))
}
