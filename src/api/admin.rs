use askama::Template;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Form, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::flash::{self, Level};
use crate::api::middleware::session::{AppState, CurrentUser};
use crate::api::portal::{pdf_response, PaymentForm};
use crate::api::views::{
    format_amount, payment_method_options, Layout, LicenseRow, SelectOption, UserRow,
};
use crate::error::{AppError, Result};
use crate::models::{License, LicenseStatus, User};
use crate::services::license_workflow::{self, WorkflowError};
use crate::services::lifecycle::{PaymentInput, TransitionError};
use crate::services::policy;
use crate::services::validation::{parse_payment_method, FieldErrors};

/// Number of approvals shown on the dashboard.
const RECENT_APPROVALS: i64 = 5;

#[derive(Template)]
#[template(path = "admin/dashboard.html")]
struct DashboardTemplate {
    layout: Layout,
    pending: Vec<LicenseRow>,
    recent: Vec<LicenseRow>,
    citizen_count: i64,
}

#[derive(Template)]
#[template(path = "admin/licenses.html")]
struct LicensesTemplate {
    layout: Layout,
    licenses: Vec<LicenseRow>,
}

#[derive(Template)]
#[template(path = "admin/license.html")]
struct LicenseTemplate {
    layout: Layout,
    license: LicenseRow,
}

#[derive(Template)]
#[template(path = "admin/initiate_payment.html")]
struct InitiatePaymentTemplate {
    layout: Layout,
    license: LicenseRow,
    methods: Vec<SelectOption>,
    bank_name: String,
    errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "admin/users.html")]
struct UsersTemplate {
    layout: Layout,
    users: Vec<UserRow>,
}

/// Actions accepted by `/admin/license/:id/:action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    View,
    Approve,
    Reject,
    Cancel,
}

impl ReviewAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "view" => Some(Self::View),
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            Self::View => "viewed",
            Self::Approve => "approved",
            Self::Reject => "rejected",
            Self::Cancel => "cancelled",
        }
    }
}

fn license_page(id: i64) -> String {
    format!("/admin/license/{}/view", id)
}

async fn notify(session: &Session, level: Level, message: String, to: &str) -> Result<Response> {
    flash::push(session, level, message).await?;
    Ok(Redirect::to(to).into_response())
}

async fn load(state: &AppState, id: i64) -> Result<License> {
    License::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("License {}", id)))
}

async fn dashboard(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    session: Session,
) -> Result<Html<String>> {
    let actor = admin.actor();
    let pending = License::list_by_status(&state.pool, LicenseStatus::Pending).await?;
    let recent = License::list_recently_approved(&state.pool, RECENT_APPROVALS).await?;
    let citizen_count = User::count_citizens(&state.pool).await?;

    let template = DashboardTemplate {
        layout: Layout::load(&session).await?,
        pending: LicenseRow::list(&pending, &actor),
        recent: LicenseRow::list(&recent, &actor),
        citizen_count,
    };
    Ok(Html(template.render()?))
}

async fn licenses(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    session: Session,
) -> Result<Html<String>> {
    let licenses = License::list_all(&state.pool).await?;

    let template = LicensesTemplate {
        layout: Layout::load(&session).await?,
        licenses: LicenseRow::list(&licenses, &admin.actor()),
    };
    Ok(Html(template.render()?))
}

/// GET on any known action shows the license; changes only happen on POST.
async fn show_license(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    session: Session,
    Path((id, action)): Path<(i64, String)>,
) -> Result<Html<String>> {
    if ReviewAction::parse(&action).is_none() {
        return Err(AppError::NotFound(format!("Action '{}'", action)));
    }

    let license = load(&state, id).await?;
    let template = LicenseTemplate {
        layout: Layout::load(&session).await?,
        license: LicenseRow::new(&license, &admin.actor()),
    };
    Ok(Html(template.render()?))
}

async fn apply_action(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    session: Session,
    Path((id, action)): Path<(i64, String)>,
) -> Result<Response> {
    let Some(action) = ReviewAction::parse(&action) else {
        return Err(AppError::NotFound(format!("Action '{}'", action)));
    };

    let actor = admin.actor();
    let now = Utc::now();
    let outcome = match action {
        ReviewAction::View => return Ok(Redirect::to(&license_page(id)).into_response()),
        ReviewAction::Approve => {
            let fee = state.config.base_fee;
            license_workflow::review(&state.pool, &actor, id, LicenseStatus::Approved, fee, now)
                .await
        }
        ReviewAction::Reject => {
            let fee = state.config.base_fee;
            license_workflow::review(&state.pool, &actor, id, LicenseStatus::Rejected, fee, now)
                .await
        }
        ReviewAction::Cancel => license_workflow::cancel(&state.pool, &actor, id).await,
    };

    match outcome {
        Ok(license) => {
            let mut message = format!(
                "License {} has been {}.",
                license.license_number(),
                action.past_tense()
            );
            if let Some(amount) = license.payment_amount {
                message.push_str(&format!(
                    " Amount due: {}.",
                    format_amount(amount)
                ));
            }
            notify(&session, Level::Success, message, "/admin/dashboard").await
        }
        Err(e) => {
            let notice = flash::user_notice(e)?;
            notify(&session, Level::Warning, notice, &license_page(id)).await
        }
    }
}

async fn initiate_payment_form(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Response> {
    let actor = admin.actor();
    let license = load(&state, id).await?;

    if !policy::can_initiate_payment(&actor, &license) {
        let notice = TransitionError::NotAwaitingPayment.to_string();
        return notify(&session, Level::Warning, notice, &license_page(id)).await;
    }

    let template = InitiatePaymentTemplate {
        layout: Layout::load(&session).await?,
        license: LicenseRow::new(&license, &actor),
        methods: payment_method_options(
            license.payment_method.map(|m| m.as_str()).unwrap_or_default(),
        ),
        bank_name: license.bank_name.clone().unwrap_or_default(),
        errors: FieldErrors::default(),
    };
    Ok(Html(template.render()?).into_response())
}

async fn initiate_payment(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    session: Session,
    Path(id): Path<i64>,
    Form(form): Form<PaymentForm>,
) -> Result<Response> {
    let actor = admin.actor();
    let input = form.to_input();

    let outcome = match input.method {
        Some(method) => {
            license_workflow::initiate_payment(&state.pool, &actor, id, method, input.bank_name)
                .await
        }
        None => Err(WorkflowError::Transition(TransitionError::MissingPaymentMethod)),
    };

    match outcome {
        Ok(license) => {
            let method = license
                .payment_method
                .map(|m| m.label())
                .unwrap_or_default();
            let message = format!(
                "Payment initiated for {} via {}.",
                license.license_number(),
                method
            );
            notify(&session, Level::Success, message, &license_page(id)).await
        }
        Err(WorkflowError::Transition(
            err @ (TransitionError::MissingPaymentMethod | TransitionError::MissingBankName),
        )) => {
            let mut errors = FieldErrors::default();
            let field = if err == TransitionError::MissingBankName {
                "bank_name"
            } else {
                "payment_method"
            };
            errors.add(field, err.to_string());

            let license = load(&state, id).await?;
            let template = InitiatePaymentTemplate {
                layout: Layout::load(&session).await?,
                license: LicenseRow::new(&license, &actor),
                methods: payment_method_options(&form.payment_method),
                bank_name: form.bank_name.clone(),
                errors,
            };
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(template.render()?)).into_response())
        }
        Err(e) => {
            let notice = flash::user_notice(e)?;
            notify(&session, Level::Warning, notice, &license_page(id)).await
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfirmPaymentForm {
    reference: String,
    payment_method: String,
}

async fn confirm_payment(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    session: Session,
    Path(id): Path<i64>,
    Form(form): Form<ConfirmPaymentForm>,
) -> Result<Response> {
    let reference = form.reference.trim();
    let input = PaymentInput {
        method: parse_payment_method(&form.payment_method),
        bank_name: None,
        reference: (!reference.is_empty()).then(|| reference.to_string()),
    };

    match license_workflow::complete_payment(
        &state.pool,
        &state.artifacts,
        &admin.actor(),
        id,
        input,
        Utc::now(),
    )
    .await
    {
        Ok(license) => {
            let message = format!(
                "Payment confirmed for {}. The license document has been issued.",
                license.license_number()
            );
            notify(&session, Level::Success, message, &license_page(id)).await
        }
        Err(e) => {
            let notice = flash::user_notice(e)?;
            notify(&session, Level::Warning, notice, &license_page(id)).await
        }
    }
}

async fn users(State(state): State<AppState>, session: Session) -> Result<Html<String>> {
    let users = User::list_citizens(&state.pool).await?;

    let template = UsersTemplate {
        layout: Layout::load(&session).await?,
        users: users.iter().map(UserRow::from).collect(),
    };
    Ok(Html(template.render()?))
}

async fn download(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Response> {
    match license_workflow::license_pdf(&state.pool, &state.artifacts, &admin.actor(), id).await {
        Ok((license, bytes)) => Ok(pdf_response(&license, bytes)),
        Err(e) => {
            let notice = flash::user_notice(e)?;
            notify(&session, Level::Warning, notice, &license_page(id)).await
        }
    }
}

/// Administrator routes. Every route here expects the admin guard.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/licenses", get(licenses))
        .route("/admin/license/:id/:action", get(show_license).post(apply_action))
        .route(
            "/admin/payment/initiate/:id",
            get(initiate_payment_form).post(initiate_payment),
        )
        .route("/admin/payment/confirm/:id", post(confirm_payment))
        .route("/admin/users", get(users))
        .route("/admin/download/:id", get(download))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_actions() {
        assert_eq!(ReviewAction::parse("view"), Some(ReviewAction::View));
        assert_eq!(ReviewAction::parse("approve"), Some(ReviewAction::Approve));
        assert_eq!(ReviewAction::parse("reject"), Some(ReviewAction::Reject));
        assert_eq!(ReviewAction::parse("cancel"), Some(ReviewAction::Cancel));
        assert_eq!(ReviewAction::parse("delete"), None);
        assert_eq!(ReviewAction::Approve.past_tense(), "approved");
    }
}
