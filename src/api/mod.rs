mod appointments;
pub mod auth;
mod dashboard;
pub mod error;
pub mod gate;
mod patients;
pub mod policy;
mod psychologists;
pub mod response;
mod rooms;
pub mod validation;

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Answers a bare OPTIONS on the CORS-enabled collections
async fn preflight() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store.name(),
    }))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    // Collection endpoints that answer cross-origin requests
    let collection_routes = Router::new()
        .route(
            "/patients",
            get(patients::list_patients)
                .post(patients::create_patient)
                .options(preflight),
        )
        .route(
            "/rooms",
            get(rooms::list_rooms)
                .post(rooms::create_room)
                .options(preflight),
        )
        .route(
            "/psychologists",
            get(psychologists::list_psychologists)
                .post(psychologists::create_psychologist)
                .options(preflight),
        )
        .layer(cors_layer());

    let api_routes = Router::new()
        .route("/dashboard/stats", get(dashboard::get_stats))
        // Patients
        .route(
            "/patients/by-psychologist/:email",
            get(patients::patients_by_psychologist),
        )
        .route(
            "/patients/:id",
            get(patients::get_patient)
                .put(patients::update_patient)
                .delete(patients::delete_patient),
        )
        // Rooms
        .route(
            "/rooms/:id",
            get(rooms::get_room)
                .put(rooms::update_room)
                .delete(rooms::delete_room),
        )
        .route("/rooms/:id/toggle", post(rooms::toggle_room))
        // Appointments
        .route(
            "/appointments",
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route(
            "/appointments/:id",
            get(appointments::get_appointment)
                .put(appointments::update_appointment)
                .delete(appointments::delete_appointment),
        )
        .route(
            "/appointments/:id/status",
            put(appointments::update_status).patch(appointments::update_status),
        )
        // Psychologists
        .route(
            "/psychologists/:id",
            get(psychologists::get_psychologist)
                .put(psychologists::update_psychologist)
                .delete(psychologists::delete_psychologist),
        )
        .route(
            "/psychologists/:id/toggle-active",
            post(psychologists::toggle_active),
        )
        .merge(collection_routes);

    // Front-end build with SPA fallback to index.html
    let static_dir = &state.config.server.static_dir;
    let serve_static =
        ServeDir::new(static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/health", get(health))
        .route("/logout", get(auth::logout))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .fallback_service(serve_static)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::session_gate,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
