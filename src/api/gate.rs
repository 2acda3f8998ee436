//! Session gate: resolves the session cookie for every request and applies
//! the path rules before any handler runs.
//!
//! Rules, in order:
//! 1. anonymous request to a protected path: `307` to `/login?from=<path>`
//! 2. non-superadmin on a superadmin-only path: `403` with
//!    `Location: /dashboard?error=access_denied`
//! 3. signed-in user on the login page: `303` to `/dashboard`
//!
//! Static assets and CORS preflights bypass the gate.

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;
use tracing::debug;

use super::auth::{current_user, SessionUser};
use crate::config::AccessConfig;
use crate::db::UserProfile;
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Redirect { status: StatusCode, location: String },
}

/// Whole-segment prefix match: `/rooms` matches `/rooms` and `/rooms/A`, not `/roomsx`.
fn path_matches(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path == "/";
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn matches_any(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| path_matches(path, p))
}

pub fn is_static_path(access: &AccessConfig, path: &str) -> bool {
    matches_any(path, &access.static_prefixes)
}

/// Escape the characters that would end or change the `from` query value.
fn encode_from(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '#' => out.push_str("%23"),
            '+' => out.push_str("%2B"),
            ' ' => out.push_str("%20"),
            _ => out.push(c),
        }
    }
    out
}

/// Apply the access rules to a path and resolved user.
pub fn evaluate(access: &AccessConfig, path: &str, user: Option<&UserProfile>) -> GateDecision {
    let is_login = path_matches(path, &access.login_path);
    let is_public = is_login || matches_any(path, &access.public_paths);

    match user {
        None if !is_public => GateDecision::Redirect {
            status: StatusCode::TEMPORARY_REDIRECT,
            location: format!("{}?from={}", access.login_path, encode_from(path)),
        },
        Some(user) if !user.is_superadmin() && matches_any(path, &access.superadmin_paths) => {
            GateDecision::Redirect {
                status: StatusCode::FORBIDDEN,
                location: format!("{}?error=access_denied", access.dashboard_path),
            }
        }
        Some(_) if is_login => GateDecision::Redirect {
            status: StatusCode::SEE_OTHER,
            location: access.dashboard_path.clone(),
        },
        _ => GateDecision::Pass,
    }
}

pub async fn session_gate(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let access = &state.config.access;
    let path = request.uri().path().to_string();

    if request.method() == Method::OPTIONS || is_static_path(access, &path) {
        return next.run(request).await;
    }

    let user = current_user(&state, &jar).await;

    match evaluate(access, &path, user.as_ref()) {
        GateDecision::Pass => {
            request.extensions_mut().insert(SessionUser(user));
            next.run(request).await
        }
        GateDecision::Redirect { status, location } => {
            debug!(path = %path, status = %status, location = %location, "Session gate redirect");
            (status, [(header::LOCATION, location)]).into_response()
        }
    }
}
