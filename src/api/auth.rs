use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::flash::{self, Level};
use crate::api::middleware::session::{
    current_user, AppState, CurrentUser, SESSION_KEY_CURRENT_USER,
};
use crate::api::views::{options, Layout, SelectOption};
use crate::error::Result;
use crate::models::user::{unique_violation, User};
use crate::services::password::{hash_password, verify_password};
use crate::services::validation::{
    validate_registration_now, FieldErrors, LoginForm, RegistrationForm, DISTRICTS,
    REFERRAL_SOURCES,
};

#[derive(Template)]
#[template(path = "auth/register.html")]
struct RegisterTemplate {
    layout: Layout,
    form: RegistrationForm,
    errors: FieldErrors,
    districts: Vec<SelectOption>,
    referral_sources: Vec<SelectOption>,
}

impl RegisterTemplate {
    fn new(layout: Layout, form: RegistrationForm, errors: FieldErrors) -> Self {
        Self {
            districts: options(DISTRICTS, &form.district),
            referral_sources: options(REFERRAL_SOURCES, &form.hear_about),
            layout,
            form,
            errors,
        }
    }
}

#[derive(Template)]
#[template(path = "auth/login.html")]
struct LoginTemplate {
    layout: Layout,
    email: String,
    next: String,
    failure: String,
    errors: FieldErrors,
}

/// Accepts only same-site relative paths as post-login destinations.
pub fn safe_next(next: &str) -> Option<&str> {
    let next = next.trim();
    let safe = next.starts_with('/')
        && !next.starts_with("//")
        && !next.contains('\\')
        && !next.contains("://")
        && !next.chars().any(char::is_control);

    safe.then_some(next)
}

fn landing_page(user: &CurrentUser) -> &'static str {
    if user.is_admin() {
        "/admin/dashboard"
    } else {
        "/dashboard"
    }
}

async fn register_form(session: Session) -> Result<Response> {
    if let Some(user) = current_user(&session).await? {
        return Ok(Redirect::to(landing_page(&user)).into_response());
    }

    let template = RegisterTemplate::new(
        Layout::load(&session).await?,
        RegistrationForm::default(),
        FieldErrors::default(),
    );
    Ok(Html(template.render()?).into_response())
}

async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegistrationForm>,
) -> Result<Response> {
    let rerender = |errors: FieldErrors, form: &RegistrationForm, layout: Layout| -> Result<Response> {
        let template = RegisterTemplate::new(layout, form.without_passwords(), errors);
        Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(template.render()?)).into_response())
    };

    let valid = match validate_registration_now(&form) {
        Ok(valid) => valid,
        Err(errors) => return rerender(errors, &form, Layout::load(&session).await?),
    };

    let conflicts = User::find_conflicts(&state.pool, &valid.email, &valid.national_id).await?;
    if !conflicts.is_empty() {
        let mut errors = FieldErrors::default();
        for field in conflicts {
            errors.add_conflict(field);
        }
        return rerender(errors, &form, Layout::load(&session).await?);
    }

    let password_hash = hash_password(&valid.password).map_err(anyhow::Error::from)?;

    let user = match User::create(&state.pool, valid.into_create_data(password_hash)).await {
        Ok(user) => user,
        Err(e) => match unique_violation(&e) {
            // Lost a race with a concurrent registration
            Some(field) => {
                let mut errors = FieldErrors::default();
                errors.add_conflict(field);
                return rerender(errors, &form, Layout::load(&session).await?);
            }
            None => return Err(e.into()),
        },
    };

    tracing::info!(user_id = %user.id, "Registered new user");

    flash::push(
        &session,
        Level::Success,
        "Registration successful! Please log in.",
    )
    .await?;
    Ok(Redirect::to("/login").into_response())
}

#[derive(Debug, Default, Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

async fn login_form(session: Session, Query(query): Query<LoginQuery>) -> Result<Response> {
    if let Some(user) = current_user(&session).await? {
        return Ok(Redirect::to(landing_page(&user)).into_response());
    }

    let template = LoginTemplate {
        layout: Layout::load(&session).await?,
        email: String::new(),
        next: query
            .next
            .as_deref()
            .and_then(safe_next)
            .unwrap_or_default()
            .to_string(),
        failure: String::new(),
        errors: FieldErrors::default(),
    };
    Ok(Html(template.render()?).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginSubmission {
    email: String,
    password: String,
    next: String,
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(submission): Form<LoginSubmission>,
) -> Result<Response> {
    let form = LoginForm {
        email: submission.email.trim().to_lowercase(),
        password: submission.password,
    };
    let next = safe_next(&submission.next).unwrap_or_default().to_string();

    let mut template = LoginTemplate {
        layout: Layout::default(),
        email: form.email.clone(),
        next: next.clone(),
        failure: String::new(),
        errors: FieldErrors::default(),
    };

    if let Err(errors) = form.validate() {
        template.layout = Layout::load(&session).await?;
        template.errors = errors;
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(template.render()?)).into_response());
    }

    let user = User::find_by_email(&state.pool, &form.email)
        .await?
        .filter(|user| verify_password(&form.password, &user.password_hash));

    let Some(user) = user else {
        tracing::warn!(email = %form.email, "Failed login attempt");
        template.layout = Layout::load(&session).await?;
        template.failure = "Login unsuccessful. Please check email and password.".to_string();
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(template.render()?)).into_response());
    };

    let current = CurrentUser::from(&user);

    // New session id on privilege change
    session.cycle_id().await?;
    session.insert(SESSION_KEY_CURRENT_USER, &current).await?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "User logged in");

    flash::push(
        &session,
        Level::Success,
        format!("Welcome back, {}!", user.first_name),
    )
    .await?;

    let destination = if next.is_empty() {
        landing_page(&current).to_string()
    } else {
        next
    };
    Ok(Redirect::to(&destination).into_response())
}

async fn logout(session: Session) -> Result<Redirect> {
    if let Some(user) = session.remove::<CurrentUser>(SESSION_KEY_CURRENT_USER).await? {
        tracing::info!(user_id = %user.id, "User logged out");
    }
    session.cycle_id().await?;

    flash::push(&session, Level::Info, "You have been logged out.").await?;
    Ok(Redirect::to("/"))
}

/// Creates the authentication router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", get(register_form).post(register))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next_accepts_local_paths() {
        assert_eq!(safe_next("/dashboard"), Some("/dashboard"));
        assert_eq!(safe_next("/license/4/make-payment"), Some("/license/4/make-payment"));
    }

    #[test]
    fn test_safe_next_rejects_offsite_targets() {
        assert_eq!(safe_next("https://evil.example"), None);
        assert_eq!(safe_next("//evil.example"), None);
        assert_eq!(safe_next("/\\evil.example"), None);
        assert_eq!(safe_next("dashboard"), None);
        assert_eq!(safe_next(""), None);
    }
}
