//! Public verification of a scanned license QR code.

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::session::AppState;
use crate::api::views::{format_date, Layout};
use crate::error::Result;
use crate::models::license::parse_license_number;
use crate::models::License;
use crate::services::qr_generator::verify_code;
use crate::services::validation::{label_for, FISHING_ZONES};

#[derive(Template)]
#[template(path = "verify.html")]
struct VerifyTemplate {
    layout: Layout,
    license_number: String,
    genuine: bool,
    valid: bool,
    holder: String,
    zone: String,
    issued: String,
    expires: String,
}

#[derive(Debug, Default, Deserialize)]
struct VerifyQuery {
    code: Option<String>,
}

/// Outcome of checking a license against a presented verification code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Unknown,
    Valid { issued_on: NaiveDate, expires_on: NaiveDate },
    Expired { issued_on: NaiveDate, expires_on: NaiveDate },
}

/// Checks `code` against an issued license. Unpaid or never-issued licenses
/// are never genuine.
pub fn assess(license: &License, code: &str, signing_key: &[u8], today: NaiveDate) -> Verdict {
    if !license.is_approved() || !license.payment_completed() {
        return Verdict::Unknown;
    }

    let (Some(issued_on), Some(expires_on)) = (license.issued_on(), license.expires_on()) else {
        return Verdict::Unknown;
    };

    if !verify_code(license, issued_on, code, signing_key) {
        return Verdict::Unknown;
    }

    if today <= expires_on {
        Verdict::Valid { issued_on, expires_on }
    } else {
        Verdict::Expired { issued_on, expires_on }
    }
}

async fn verify(
    State(state): State<AppState>,
    session: Session,
    Path(number): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> Result<Response> {
    let license = match parse_license_number(&number) {
        Some(id) => License::find_by_id(&state.pool, id).await?,
        None => None,
    };

    let code = query.code.unwrap_or_default();
    let verdict = license
        .as_ref()
        .map(|l| assess(l, code.trim(), state.artifacts.signing_key(), Utc::now().date_naive()))
        .unwrap_or(Verdict::Unknown);

    let mut template = VerifyTemplate {
        layout: Layout::load(&session).await?,
        license_number: number.clone(),
        genuine: false,
        valid: false,
        holder: String::new(),
        zone: String::new(),
        issued: String::new(),
        expires: String::new(),
    };

    let (issued_on, expires_on, valid) = match verdict {
        Verdict::Unknown => {
            tracing::info!(license_number = %number, "License verification failed");
            return Ok((StatusCode::NOT_FOUND, Html(template.render()?)).into_response());
        }
        Verdict::Valid { issued_on, expires_on } => (issued_on, expires_on, true),
        Verdict::Expired { issued_on, expires_on } => (issued_on, expires_on, false),
    };

    if let Some(license) = license {
        template.license_number = license.license_number();
        template.holder = license.full_name;
        template.zone = label_for(FISHING_ZONES, &license.fishing_zone);
    }
    template.genuine = true;
    template.valid = valid;
    template.issued = format_date(issued_on);
    template.expires = format_date(expires_on);

    tracing::info!(license_number = %template.license_number, valid, "License verified");

    Ok(Html(template.render()?).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/verify/:license_number", get(verify))
}
