//! Router-level tests that never reach the database: guards, form
//! validation and public pages. The pool is lazy and never connected.

use axum::{
    body::Body,
    extract::Path,
    http::{header, Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use secrecy::Secret;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use tower_sessions::{MemoryStore, Session, SessionManagerLayer};

use licensing_portal::api::build_router;
use licensing_portal::api::middleware::session::{AppState, CurrentUser, SESSION_KEY_CURRENT_USER};
use licensing_portal::config::Config;
use licensing_portal::models::Role;

fn test_config() -> Config {
    let root = std::env::temp_dir().join(format!("licensing-http-{}", uuid::Uuid::new_v4()));
    Config {
        database_url: "postgres://postgres@localhost/licensing_unused".to_string(),
        base_url: "http://localhost:8000".to_string(),
        host: "127.0.0.1".to_string(),
        port: 8000,
        static_dir: root.join("static"),
        artifact_dir: root.join("licenses"),
        max_upload_bytes: 1024 * 1024,
        session_cookie_secure: false,
        session_lifetime_secs: 3600,
        base_fee: 5000,
        secret_key: Secret::new("test-secret".to_string()),
    }
}

async fn sign_in_as(session: Session, Path(role): Path<String>) -> StatusCode {
    let role = if role == "admin" { Role::Admin } else { Role::User };
    session
        .insert(
            SESSION_KEY_CURRENT_USER,
            CurrentUser {
                id: 7,
                role,
                name: "Chisomo Banda".to_string(),
            },
        )
        .await
        .unwrap();
    StatusCode::OK
}

fn app() -> Router {
    let config = test_config();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();

    build_router(AppState::new(pool, config))
        .merge(Router::new().route("/test/sign-in/:role", get(sign_in_as)))
        .layer(SessionManagerLayer::new(MemoryStore::default()).with_secure(false))
}

fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Signs in through the test route and returns the session cookie.
async fn session_cookie(app: &Router, role: &str) -> String {
    let response = app
        .clone()
        .oneshot(get_request(&format!("/test/sign-in/{}", role), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("session cookie");
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn test_anonymous_user_is_sent_to_login() {
    let app = app();

    let response = app
        .clone()
        .oneshot(get_request("/dashboard", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?next=%2Fdashboard");

    let response = app
        .oneshot(get_request("/admin/licenses", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?next=%2Fadmin%2Flicenses");
}

#[tokio::test]
async fn test_anonymous_post_is_redirected_not_applied() {
    let app = app();

    let response = app
        .oneshot(post_form("/license/1/cancel", "", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/login?next="));
}

#[tokio::test]
async fn test_citizen_is_turned_away_from_admin_pages_with_notice() {
    let app = app();
    let cookie = session_cookie(&app, "user").await;

    let response = app
        .clone()
        .oneshot(get_request("/admin/dashboard", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = app
        .clone()
        .oneshot(post_form("/admin/license/1/approve", "", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let home = app
        .oneshot(get_request("/", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(home.status(), StatusCode::OK);
    let html = body_text(home).await;
    assert!(html.contains("You do not have permission to access this page."));
}

#[tokio::test]
async fn test_flash_is_shown_once() {
    let app = app();
    let cookie = session_cookie(&app, "user").await;

    app.clone()
        .oneshot(get_request("/admin/users", Some(&cookie)))
        .await
        .unwrap();

    let first = body_text(app.clone().oneshot(get_request("/", Some(&cookie))).await.unwrap()).await;
    let second = body_text(app.oneshot(get_request("/", Some(&cookie))).await.unwrap()).await;

    assert!(first.contains("You do not have permission"));
    assert!(!second.contains("You do not have permission"));
}

#[tokio::test]
async fn test_invalid_application_is_rerendered_with_errors() {
    let app = app();
    let cookie = session_cookie(&app, "user").await;

    let response = app
        .oneshot(post_form(
            "/apply-license",
            "full_name=Chisomo+Banda&id_number=MW-88213&fishing_zone=moon&duration=7",
            Some(&cookie),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = body_text(response).await;
    assert!(html.contains("Please select a valid option."));
    assert!(html.contains("value=\"Chisomo Banda\""));
}

#[tokio::test]
async fn test_invalid_registration_is_rerendered_without_passwords() {
    let app = app();

    let response = app
        .oneshot(post_form(
            "/register",
            "first_name=Chisomo&email=not-an-email&password=hunter22&confirm_password=other",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = body_text(response).await;
    assert!(html.contains("Invalid email address."));
    assert!(html.contains("Passwords must match."));
    assert!(html.contains("This field is required."));
    assert!(!html.contains("hunter22"));
}

#[tokio::test]
async fn test_empty_login_is_rejected_before_lookup() {
    let app = app();

    let response = app
        .oneshot(post_form("/login", "email=&password=", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_login_page_drops_offsite_next() {
    let app = app();

    let response = app
        .oneshot(get_request("/login?next=https://evil.example/steal", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(!html.contains("evil.example"));
}

#[tokio::test]
async fn test_unknown_admin_action_is_not_found() {
    let app = app();
    let cookie = session_cookie(&app, "admin").await;

    let response = app
        .oneshot(get_request("/admin/license/1/delete", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verify_rejects_malformed_number_with_security_headers() {
    let app = app();

    let response = app
        .oneshot(get_request("/verify/NOT-A-LICENSE?code=abc", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let headers = response.headers();
    assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "SAMEORIGIN");
    assert!(headers.contains_key(header::STRICT_TRANSPORT_SECURITY));

    let html = body_text(response).await;
    assert!(html.contains("No genuine license matches NOT-A-LICENSE"));
}

#[tokio::test]
async fn test_signed_in_user_skips_login_page() {
    let app = app();
    let cookie = session_cookie(&app, "admin").await;

    let response = app
        .oneshot(get_request("/login", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/dashboard");
}
