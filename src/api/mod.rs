// API module - HTTP endpoints

pub mod admin;
pub mod auth;
pub mod flash;
pub mod health;
pub mod middleware;
pub mod portal;
pub mod verify;
pub mod views;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    middleware::from_fn_with_state,
    routing::{get, get_service},
    Router,
};
use tower_http::{
    limit::RequestBodyLimitLayer, services::ServeDir, set_header::SetResponseHeaderLayer,
};

use self::middleware::auth::{enforce, Requirement};
use self::middleware::session::AppState;

/// Builds the full application router.
///
/// The session layer is not included: `main` installs the Postgres-backed one,
/// tests an in-memory store.
pub fn build_router(state: AppState) -> Router {
    let citizen = portal::router()
        .route_layer(from_fn_with_state(Requirement::Authenticated, enforce));
    let admin = admin::router().route_layer(from_fn_with_state(Requirement::Admin, enforce));

    let static_files = get_service(ServeDir::new(&state.config.static_dir));
    let max_body = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(portal::home))
        .merge(auth::router())
        .merge(citizen)
        .merge(admin)
        .merge(verify::router())
        .merge(health::router())
        .nest_service("/static", static_files)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .with_state(state)
}
