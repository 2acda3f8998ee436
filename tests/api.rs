use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use axum_extra::extract::cookie::{Cookie, CookieJar};

use clinic_admin::api::{
    auth::{create_account, current_user},
    create_router,
};
use clinic_admin::config::Config;
use clinic_admin::db::{Repositories, UserRole};
use clinic_admin::kv::{AtomicOperation, CommitResult, KvEntry, KvError, KvKey, KvStore, MemoryKv};
use clinic_admin::AppState;

const PASSWORD: &str = "Sup3rSecret";

struct TestApp {
    router: Router,
    repos: Repositories,
}

async fn setup() -> TestApp {
    let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let state = Arc::new(AppState::new(Config::in_memory(), store));
    let repos = state.repos.clone();

    create_account(&repos, "admin@clinic.test", "Admin", PASSWORD, UserRole::Superadmin)
        .await
        .unwrap();
    create_account(&repos, "psy@clinic.test", "Dr. Psy", PASSWORD, UserRole::Psychologist)
        .await
        .unwrap();
    create_account(&repos, "other@clinic.test", "Dr. Other", PASSWORD, UserRole::Psychologist)
        .await
        .unwrap();

    TestApp {
        router: create_router(state),
        repos,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    /// Log in and return the `Cookie` header value
    async fn login(&self, email: &str) -> String {
        let request = json_request(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": email, "password": PASSWORD }),
        );
        let (status, headers, body) = self.send(request).await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);

        let set_cookie = headers
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }
}

fn json_request(method: Method, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn location(headers: &axum::http::HeaderMap) -> &str {
    headers.get(header::LOCATION).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = setup().await;
    let (status, _, body) = app.send(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn test_anonymous_request_redirects_to_login() {
    let app = setup().await;

    let (status, headers, _) = app.send(get("/dashboard", None)).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&headers), "/login?from=/dashboard");

    let (status, headers, _) = app.send(get("/api/patients", None)).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&headers), "/login?from=/api/patients");
}

#[tokio::test]
async fn test_psychologist_blocked_from_superadmin_paths() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;

    let (status, headers, _) = app.send(get("/api/psychologists", Some(&cookie))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(location(&headers), "/dashboard?error=access_denied");

    let (status, headers, _) = app.send(get("/psychologists", Some(&cookie))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(location(&headers), "/dashboard?error=access_denied");
}

#[tokio::test]
async fn test_signed_in_user_leaves_login_page() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;

    let (status, headers, _) = app.send(get("/login", Some(&cookie))).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/dashboard");
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let app = setup().await;
    let request = json_request(
        Method::POST,
        "/api/auth/login",
        None,
        json!({ "email": "psy@clinic.test", "password": "wrong" }),
    );
    let (status, headers, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert!(headers.get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_me_and_logout() {
    let app = setup().await;
    let cookie = app.login("admin@clinic.test").await;

    let (status, _, body) = app.send(get("/api/auth/me", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "admin@clinic.test");
    assert_eq!(body["data"]["role"], "superadmin");
    assert!(body["data"].get("passwordHash").is_none());

    let (status, headers, _) = app.send(get("/logout", Some(&cookie))).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/login");

    // The session is gone even if the browser keeps the cookie
    let (status, _, _) = app.send(get("/api/auth/me", Some(&cookie))).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_patient_create_and_fetch() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;

    let request = json_request(
        Method::POST,
        "/api/patients",
        Some(&cookie),
        json!({ "name": "Ana Souza", "email": "ana@example.com", "phone": "+55 11 5555-0100" }),
    );
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _, body) = app.send(get(&format!("/api/patients/{}", id), Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Ana Souza");

    let (status, _, body) = app.send(get("/api/patients?q=souza", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_patient_without_name_is_rejected() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;

    let request = json_request(Method::POST, "/api/patients", Some(&cookie), json!({ "phone": "555-0100" }));
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Name is required");
    assert_eq!(app.repos.patients.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_patient_is_404() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;
    let (status, _, body) = app.send(get("/api/patients/nope", Some(&cookie))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_room_lifecycle() {
    let app = setup().await;
    let admin = app.login("admin@clinic.test").await;

    let request = json_request(
        Method::POST,
        "/api/rooms",
        Some(&admin),
        json!({ "id": "b", "name": "Sala B", "capacity": 4 }),
    );
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["id"], "B");
    assert_eq!(body["data"]["isAvailable"], true);

    // Same id again is a validation error
    let request = json_request(Method::POST, "/api/rooms", Some(&admin), json!({ "id": "B", "name": "Dup" }));
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = json_request(Method::POST, "/api/rooms/B/toggle", Some(&admin), json!({}));
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isAvailable"], false);

    let (_, _, body) = app.send(get("/api/dashboard/stats", Some(&admin))).await;
    assert_eq!(body["data"]["totalRooms"], 1);
    assert_eq!(body["data"]["availableRooms"], 0);
    assert_eq!(body["data"]["totalUsers"], 3);
    assert_eq!(body["data"]["totalPsychologists"], 2);
}

#[tokio::test]
async fn test_psychologist_cannot_create_rooms() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;

    let request = json_request(Method::POST, "/api/rooms", Some(&cookie), json!({ "id": "C", "name": "Sala C" }));
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

async fn book(app: &TestApp, cookie: &str, body: Value) -> String {
    let request = json_request(Method::POST, "/api/appointments", Some(cookie), body);
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED, "booking failed: {}", body);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_psychologist_books_under_own_email() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;

    let id = book(
        &app,
        &cookie,
        json!({ "patientName": "Ana", "appointmentDate": "2026-03-14", "appointmentTime": "10:00" }),
    )
    .await;

    let stored = app.repos.appointments.get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.psychologist_email, "psy@clinic.test");
    assert_eq!(stored.psychologist_name.as_deref(), Some("Dr. Psy"));
    assert_eq!(stored.status.as_str(), "pending");

    let request = json_request(
        Method::POST,
        "/api/appointments",
        Some(&cookie),
        json!({
            "patientName": "Bia",
            "psychologistEmail": "other@clinic.test",
            "appointmentDate": "2026-03-14",
            "appointmentTime": "11:00"
        }),
    );
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_status_leaves_record_unchanged() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;
    let id = book(
        &app,
        &cookie,
        json!({ "patientName": "Ana", "appointmentDate": "2026-03-14", "appointmentTime": "10:00" }),
    )
    .await;
    let before = app.repos.appointments.get_by_id(&id).await.unwrap().unwrap();

    let uri = format!("/api/appointments/{}/status", id);
    let request = json_request(Method::PATCH, &uri, Some(&cookie), json!({ "status": "archived" }));
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let after = app.repos.appointments.get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(before, after);

    let request = json_request(Method::PUT, &uri, Some(&cookie), json!({ "status": "completed" }));
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");

    // Any status may follow any other
    let request = json_request(Method::PUT, &uri, Some(&cookie), json!({ "status": "pending" }));
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_status_update_on_missing_appointment_is_404() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;
    let request = json_request(
        Method::PUT,
        "/api/appointments/missing/status",
        Some(&cookie),
        json!({ "status": "archived" }),
    );
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ownership_is_enforced() {
    let app = setup().await;
    let psy = app.login("psy@clinic.test").await;
    let other = app.login("other@clinic.test").await;

    let id = book(
        &app,
        &psy,
        json!({ "patientName": "Ana", "appointmentDate": "2026-03-14", "appointmentTime": "10:00" }),
    )
    .await;
    let uri = format!("/api/appointments/{}", id);

    let request = Request::builder()
        .method(Method::DELETE)
        .uri(&uri)
        .header(header::COOKIE, &other)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = json_request(Method::PUT, &format!("{}/status", uri), Some(&other), json!({ "status": "cancelled" }));
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The other psychologist does not see it in their list
    let (_, _, body) = app.send(get("/api/appointments", Some(&other))).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    // The owner can delete it
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(&uri)
        .header(header::COOKIE, &psy)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.repos.appointments.get_by_id(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_superadmin_manages_psychologists() {
    let app = setup().await;
    let admin = app.login("admin@clinic.test").await;

    let request = json_request(
        Method::POST,
        "/api/psychologists",
        Some(&admin),
        json!({ "email": "New@Clinic.test", "name": "Dr. New", "password": "An0therSecret" }),
    );
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["email"], "new@clinic.test");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let request = json_request(
        Method::POST,
        &format!("/api/psychologists/{}/toggle-active", id),
        Some(&admin),
        json!({}),
    );
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isActive"], false);

    // Deactivated accounts cannot sign in
    let request = json_request(
        Method::POST,
        "/api/auth/login",
        None,
        json!({ "email": "new@clinic.test", "password": "An0therSecret" }),
    );
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, _, body) = app.send(get("/api/psychologists", Some(&admin))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_patients_by_psychologist() {
    let app = setup().await;
    let psy = app.login("psy@clinic.test").await;

    for name in ["Ana", "Bia"] {
        let request = json_request(Method::POST, "/api/patients", Some(&psy), json!({ "name": name }));
        let (status, _, _) = app.send(request).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    book(
        &app,
        &psy,
        json!({ "patientName": "Ana", "appointmentDate": "2026-03-14", "appointmentTime": "10:00" }),
    )
    .await;

    let (status, _, body) = app
        .send(get("/api/patients/by-psychologist/psy@clinic.test", Some(&psy)))
        .await;
    assert_eq!(status, StatusCode::OK);
    let patients = body["data"].as_array().unwrap();
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0]["name"], "Ana");

    let (status, _, _) = app
        .send(get("/api/patients/by-psychologist/other@clinic.test", Some(&psy)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_cors_preflight_bypasses_gate() {
    let app = setup().await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/patients")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = app.send(request).await;
    assert!(status.is_success());
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_invalid_json_body() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/patients")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, &cookie)
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request body");
}

#[tokio::test]
async fn test_malformed_query_uses_error_envelope() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;

    let (status, _, body) = app.send(get("/api/appointments?date=notadate", Some(&cookie))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid query parameters");

    let (status, _, body) = app.send(get("/api/appointments?status=archived", Some(&cookie))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_reserved_character_in_id_is_not_found() {
    let app = setup().await;
    let cookie = app.login("psy@clinic.test").await;

    let (status, _, body) = app.send(get("/api/patients/%1F", Some(&cookie))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Patient not found");

    let request = json_request(
        Method::POST,
        "/api/auth/login",
        None,
        json!({ "email": "psy\u{1f}@clinic.test", "password": PASSWORD }),
    );
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_redirect_escapes_from() {
    let app = setup().await;
    let (status, headers, _) = app.send(get("/a&b", None)).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&headers), "/login?from=/a%26b");
}

/// Store whose every operation fails
struct BrokenKv;

#[async_trait::async_trait]
impl KvStore for BrokenKv {
    async fn get(&self, _key: &KvKey) -> Result<Option<KvEntry>, KvError> {
        Err(KvError::InvalidKey("store offline".to_string()))
    }

    async fn list(&self, _prefix: &KvKey) -> Result<Vec<KvEntry>, KvError> {
        Err(KvError::InvalidKey("store offline".to_string()))
    }

    async fn commit(&self, _op: AtomicOperation) -> Result<CommitResult, KvError> {
        Err(KvError::InvalidKey("store offline".to_string()))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn test_session_store_failure_means_anonymous() {
    let store: Arc<dyn KvStore> = Arc::new(BrokenKv);
    let state = Arc::new(AppState::new(Config::in_memory(), store));

    let jar = CookieJar::new().add(Cookie::new("auth_session", "some-token"));
    assert!(current_user(&state, &jar).await.is_none());

    let router = create_router(state);
    let request = get("/dashboard", Some("auth_session=some-token"));
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(response.headers()), "/login?from=/dashboard");
}
