use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use super::session::{current_user, CurrentUser};
use crate::api::flash::{self, Level};
use crate::error::AppError;

/// What a route group demands of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Admin,
}

impl Requirement {
    pub fn is_met_by(&self, user: &CurrentUser) -> bool {
        match self {
            Requirement::Authenticated => true,
            Requirement::Admin => user.is_admin(),
        }
    }
}

/// Login URL that sends the user back to `path` afterwards.
pub fn login_redirect(path: &str) -> String {
    let next: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!("/login?next={}", next)
}

/// Route guard: redirects instead of failing, and exposes the signed-in user
/// to handlers as a `CurrentUser` extension.
///
/// Install with `middleware::from_fn_with_state(Requirement::Admin, enforce)`.
pub async fn enforce(
    State(requirement): State<Requirement>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(user) = current_user(&session).await? else {
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        flash::push(&session, Level::Info, "Please log in to access this page.").await?;
        return Ok(Redirect::to(&login_redirect(target)).into_response());
    };

    if !requirement.is_met_by(&user) {
        tracing::warn!(
            user_id = %user.id,
            path = %request.uri().path(),
            "Denied access to administrator page"
        );
        flash::push(
            &session,
            Level::Danger,
            "You do not have permission to access this page.",
        )
        .await?;
        return Ok(Redirect::to("/").into_response());
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user(role: Role) -> CurrentUser {
        CurrentUser {
            id: 3,
            role,
            name: "Chisomo Banda".to_string(),
        }
    }

    #[test]
    fn test_requirements() {
        assert!(Requirement::Authenticated.is_met_by(&user(Role::User)));
        assert!(!Requirement::Admin.is_met_by(&user(Role::User)));
        assert!(Requirement::Admin.is_met_by(&user(Role::Admin)));
    }

    #[test]
    fn test_login_redirect_encodes_target() {
        assert_eq!(login_redirect("/dashboard"), "/login?next=%2Fdashboard");
        assert_eq!(
            login_redirect("/license/4?x=1"),
            "/login?next=%2Flicense%2F4%3Fx%3D1"
        );
    }
}
