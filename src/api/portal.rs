use askama::Template;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Form, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::flash::{self, Level};
use crate::api::middleware::session::{AppState, CurrentUser};
use crate::api::views::{
    duration_options, format_amount, options, payment_method_options, Layout, LicenseRow,
    SelectOption,
};
use crate::error::Result;
use crate::models::License;
use crate::services::license_workflow::{self, WorkflowError};
use crate::services::lifecycle::{PaymentInput, TransitionError};
use crate::services::policy;
use crate::services::validation::{
    parse_payment_method, validate_application, ApplicationForm, FieldErrors, FISHING_LOCATIONS,
    FISHING_METHODS, FISHING_ZONES, LICENSE_TYPES,
};

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    layout: Layout,
}

#[derive(Template)]
#[template(path = "portal/dashboard.html")]
struct DashboardTemplate {
    layout: Layout,
    licenses: Vec<LicenseRow>,
}

#[derive(Template)]
#[template(path = "portal/apply.html")]
struct ApplyTemplate {
    layout: Layout,
    form: ApplicationForm,
    errors: FieldErrors,
    zones: Vec<SelectOption>,
    license_types: Vec<SelectOption>,
    methods: Vec<SelectOption>,
    locations: Vec<SelectOption>,
    durations: Vec<SelectOption>,
    monthly_fee: String,
}

impl ApplyTemplate {
    fn new(layout: Layout, form: ApplicationForm, errors: FieldErrors, base_fee: i64) -> Self {
        Self {
            zones: options(FISHING_ZONES, &form.fishing_zone),
            license_types: options(LICENSE_TYPES, &form.license_type),
            methods: options(FISHING_METHODS, &form.fishing_method),
            locations: options(FISHING_LOCATIONS, &form.fishing_location),
            durations: duration_options(&form.duration),
            monthly_fee: format_amount(base_fee),
            layout,
            form,
            errors,
        }
    }
}

#[derive(Template)]
#[template(path = "portal/license.html")]
struct LicenseTemplate {
    layout: Layout,
    license: LicenseRow,
}

#[derive(Template)]
#[template(path = "portal/payment.html")]
struct PaymentTemplate {
    layout: Layout,
    license: LicenseRow,
    methods: Vec<SelectOption>,
    bank_name: String,
    reference: String,
    errors: FieldErrors,
}

/// Sends the user somewhere sensible with a notice after a refused action.
async fn refuse(session: &Session, message: String, to: &str) -> Result<Response> {
    flash::push(session, Level::Warning, message).await?;
    Ok(Redirect::to(to).into_response())
}

/// Serves a license PDF as an attachment named after the license number.
pub fn pdf_response(license: &License, bytes: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{}.pdf\"", license.license_number());
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

pub async fn home(session: Session) -> Result<Html<String>> {
    let template = HomeTemplate {
        layout: Layout::load(&session).await?,
    };
    Ok(Html(template.render()?))
}

async fn dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    session: Session,
) -> Result<Html<String>> {
    let licenses = License::list_by_user(&state.pool, user.id).await?;

    let template = DashboardTemplate {
        layout: Layout::load(&session).await?,
        licenses: LicenseRow::list(&licenses, &user.actor()),
    };
    Ok(Html(template.render()?))
}

async fn apply_form(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    session: Session,
) -> Result<Html<String>> {
    let form = ApplicationForm {
        full_name: user.name.clone(),
        ..Default::default()
    };

    let template = ApplyTemplate::new(
        Layout::load(&session).await?,
        form,
        FieldErrors::default(),
        state.config.base_fee,
    );
    Ok(Html(template.render()?))
}

async fn apply(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    session: Session,
    Form(form): Form<ApplicationForm>,
) -> Result<Response> {
    let data = match validate_application(user.id, &form) {
        Ok(data) => data,
        Err(errors) => {
            let template = ApplyTemplate::new(
                Layout::load(&session).await?,
                form,
                errors,
                state.config.base_fee,
            );
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(template.render()?)).into_response());
        }
    };

    license_workflow::submit_application(&state.pool, data).await?;

    flash::push(
        &session,
        Level::Success,
        "Your license application has been submitted and is pending review.",
    )
    .await?;
    Ok(Redirect::to("/dashboard").into_response())
}

async fn view_license(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Response> {
    let actor = user.actor();
    let license = match license_workflow::load_visible(&state.pool, &actor, id).await {
        Ok(license) => license,
        Err(e @ WorkflowError::Forbidden) => {
            return refuse(&session, e.to_string(), "/dashboard").await
        }
        Err(e) => return Err(e.into()),
    };

    let template = LicenseTemplate {
        layout: Layout::load(&session).await?,
        license: LicenseRow::new(&license, &actor),
    };
    Ok(Html(template.render()?).into_response())
}

async fn payment_form(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Response> {
    let actor = user.actor();
    let license = match license_workflow::load_visible(&state.pool, &actor, id).await {
        Ok(license) => license,
        Err(e @ WorkflowError::Forbidden) => {
            return refuse(&session, e.to_string(), "/dashboard").await
        }
        Err(e) => return Err(e.into()),
    };

    if !policy::can_pay(&actor, &license) {
        let to = format!("/license/{}", id);
        return refuse(&session, TransitionError::NotAwaitingPayment.to_string(), &to).await;
    }

    let template = PaymentTemplate {
        layout: Layout::load(&session).await?,
        license: LicenseRow::new(&license, &actor),
        methods: payment_method_options(
            license.payment_method.map(|m| m.as_str()).unwrap_or_default(),
        ),
        bank_name: license.bank_name.clone().unwrap_or_default(),
        reference: String::new(),
        errors: FieldErrors::default(),
    };
    Ok(Html(template.render()?).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaymentForm {
    pub payment_method: String,
    pub bank_name: String,
    pub reference: String,
}

impl PaymentForm {
    fn optional(value: &str) -> Option<String> {
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    pub fn to_input(&self) -> PaymentInput {
        PaymentInput {
            method: parse_payment_method(&self.payment_method),
            bank_name: Self::optional(&self.bank_name),
            reference: Self::optional(&self.reference),
        }
    }
}

async fn make_payment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    session: Session,
    Path(id): Path<i64>,
    Form(form): Form<PaymentForm>,
) -> Result<Response> {
    let actor = user.actor();
    let mut errors = FieldErrors::default();
    if parse_payment_method(&form.payment_method).is_none() {
        errors.add("payment_method", "Please choose a payment method.");
    }

    let outcome = if errors.is_empty() {
        license_workflow::complete_payment(
            &state.pool,
            &state.artifacts,
            &actor,
            id,
            form.to_input(),
            Utc::now(),
        )
        .await
    } else {
        Err(WorkflowError::Transition(TransitionError::MissingPaymentMethod))
    };

    match outcome {
        Ok(license) => {
            flash::push(
                &session,
                Level::Success,
                format!(
                    "Payment successful! License {} is ready to download.",
                    license.license_number()
                ),
            )
            .await?;
            Ok(Redirect::to(&format!("/license/{}", id)).into_response())
        }
        Err(WorkflowError::Transition(
            err @ (TransitionError::MissingPaymentMethod | TransitionError::MissingBankName),
        )) => {
            let field = if err == TransitionError::MissingBankName {
                "bank_name"
            } else {
                "payment_method"
            };
            errors.add(field, err.to_string());

            let license = license_workflow::load_visible(&state.pool, &actor, id).await?;
            let template = PaymentTemplate {
                layout: Layout::load(&session).await?,
                license: LicenseRow::new(&license, &actor),
                methods: payment_method_options(&form.payment_method),
                bank_name: form.bank_name.clone(),
                reference: form.reference.clone(),
                errors,
            };
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(template.render()?)).into_response())
        }
        Err(e) => {
            let notice = flash::user_notice(e)?;
            refuse(&session, notice, &format!("/license/{}", id)).await
        }
    }
}

async fn download(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Response> {
    match license_workflow::license_pdf(&state.pool, &state.artifacts, &user.actor(), id).await {
        Ok((license, bytes)) => {
            tracing::debug!(license_id = %license.id, user_id = %user.id, "License downloaded");
            Ok(pdf_response(&license, bytes))
        }
        Err(WorkflowError::PaymentRequired) => {
            let to = if user.is_admin() {
                format!("/admin/license/{}/view", id)
            } else {
                format!("/license/{}/make-payment", id)
            };
            refuse(
                &session,
                "Please complete payment before downloading your license.".to_string(),
                &to,
            )
            .await
        }
        Err(e) => {
            let notice = flash::user_notice(e)?;
            refuse(&session, notice, "/dashboard").await
        }
    }
}

async fn cancel(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Response> {
    match license_workflow::cancel(&state.pool, &user.actor(), id).await {
        Ok(license) => {
            flash::push(
                &session,
                Level::Info,
                format!("Application {} has been cancelled.", license.license_number()),
            )
            .await?;
            Ok(Redirect::to("/dashboard").into_response())
        }
        Err(e) => {
            let notice = flash::user_notice(e)?;
            refuse(&session, notice, "/dashboard").await
        }
    }
}

/// Citizen routes. Every route here expects the authentication guard.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/apply-license", get(apply_form).post(apply))
        .route("/license/:id", get(view_license))
        .route("/license/:id/make-payment", get(payment_form).post(make_payment))
        .route("/license/:id/download", get(download))
        .route("/license/:id/cancel", post(cancel))
}
