use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::request::Parts,
    response::{IntoResponse, Redirect},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::ApiError;
use super::response::{ok, ApiResult, Success};
use crate::config::BootstrapAdmin;
use crate::db::{
    LoginRequest, Repositories, SessionRecord, UserProfile, UserResponse, UserRole, WriteOutcome,
};
use crate::kv::KvError;
use crate::AppState;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random session token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// User attached to the request by the session gate (`None` when anonymous).
#[derive(Debug, Clone)]
pub struct SessionUser(pub Option<UserProfile>);

/// Resolve a cookie token to an active user.
pub async fn resolve_session(
    repos: &Repositories,
    token: &str,
) -> Result<Option<UserProfile>, KvError> {
    let session_id = hash_token(token);
    let Some(session) = repos.sessions.get(&session_id).await? else {
        return Ok(None);
    };

    if session.is_expired(Utc::now()) {
        repos.sessions.delete(&session_id).await?;
        return Ok(None);
    }

    let user = repos.users.get_by_email(&session.user_key).await?;
    Ok(user.filter(|u| u.is_active))
}

/// Current user from the session cookie. Store failures degrade to "no user".
pub async fn current_user(state: &AppState, jar: &CookieJar) -> Option<UserProfile> {
    let token = jar.get(&state.config.auth.session_cookie)?.value().to_string();
    if token.is_empty() {
        return None;
    }

    match resolve_session(&state.repos, &token).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "Session lookup failed, treating request as anonymous");
            None
        }
    }
}

/// Extractor for the authenticated user. Uses what the gate attached, or
/// resolves the cookie itself when the gate did not run.
pub struct AuthUser(pub UserProfile);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<SessionUser>() {
            Some(SessionUser(user)) => user.clone(),
            None => {
                let jar = CookieJar::from_headers(&parts.headers);
                current_user(state, &jar).await
            }
        };

        user.map(AuthUser)
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
    }
}

/// `None` when the lifetime is not positive or overflows the calendar.
fn session_expiry(now: DateTime<Utc>, ttl_hours: i64) -> Option<DateTime<Utc>> {
    if ttl_hours <= 0 {
        return None;
    }
    now.checked_add_signed(chrono::Duration::try_hours(ttl_hours)?)
}

fn session_cookie(state: &AppState, value: String) -> Cookie<'static> {
    Cookie::build((state.config.auth.session_cookie.clone(), value))
        .path("/")
        .http_only(true)
        .secure(state.config.auth.secure_cookie)
        .same_site(SameSite::Lax)
        .build()
}

/// Login endpoint
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<Success<UserResponse>>), ApiError> {
    let Json(request) = payload?;

    let user = state
        .repos
        .users
        .get_by_email(&request.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }
    if !user.is_active {
        return Err(ApiError::unauthorized("Account is disabled"));
    }

    let token = generate_token();
    let now = Utc::now();
    let expires_at = session_expiry(now, state.config.auth.session_ttl_hours).ok_or_else(|| {
        error!(
            ttl_hours = state.config.auth.session_ttl_hours,
            "Session lifetime is out of range"
        );
        ApiError::internal("Internal server error")
    })?;
    let session = SessionRecord {
        session_id: hash_token(&token),
        user_key: user.email.clone(),
        created_at: now,
        expires_at,
    };
    state.repos.sessions.create(&session).await?;

    info!(email = %user.email, role = %user.role, "User logged in");

    let jar = jar.add(session_cookie(&state, token));
    Ok((jar, Json(Success::of(UserResponse::from(user)))))
}

/// Drop the session and clear the cookie
///
/// POST /api/auth/logout, GET /logout
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(&state.config.auth.session_cookie) {
        if let Err(e) = state.repos.sessions.delete(&hash_token(cookie.value())).await {
            warn!(error = %e, "Failed to delete session on logout");
        }
    }

    let jar = jar.remove(session_cookie(&state, String::new()));
    (jar, Redirect::to(&state.config.access.login_path))
}

/// GET /api/auth/me
pub async fn me(AuthUser(user): AuthUser) -> ApiResult<UserResponse> {
    ok(UserResponse::from(user))
}

/// Create an account with a freshly hashed password.
pub async fn create_account(
    repos: &Repositories,
    email: &str,
    name: &str,
    password: &str,
    role: UserRole,
) -> anyhow::Result<WriteOutcome<UserProfile>> {
    let password_hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    let user = UserProfile::new(email, name, role, password_hash);
    Ok(repos.users.create(user).await?)
}

/// Ensure the configured bootstrap superadmin exists
pub async fn ensure_admin_user(repos: &Repositories, admin: &BootstrapAdmin) -> anyhow::Result<()> {
    if repos.users.get_by_email(&admin.email).await?.is_some() {
        return Ok(());
    }

    match create_account(repos, &admin.email, &admin.name, &admin.password, UserRole::Superadmin).await? {
        WriteOutcome::Committed(user) => info!(email = %user.email, "Created bootstrap superadmin"),
        _ => warn!(email = %admin.email, "Bootstrap superadmin was created concurrently"),
    }
    Ok(())
}
