use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_sessions::{Expiry, Session, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::Config;
use crate::models::{Role, User};
use crate::services::artifacts::ArtifactStore;
use crate::services::policy::Actor;

/// Session keys used in the application
pub const SESSION_KEY_CURRENT_USER: &str = "current_user";
pub const SESSION_KEY_FLASHES: &str = "flashes";

/// Creates a session layer for Axum
pub async fn create_session_layer(
    pool: PgPool,
    config: &Config,
) -> Result<SessionManagerLayer<PostgresStore>, sqlx::Error> {
    // Create the session store backed by PostgreSQL
    let session_store = PostgresStore::new(pool);
    session_store.migrate().await?;

    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.session_cookie_secure)
        .with_http_only(true)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
            config.session_lifetime_secs,
        )));

    Ok(session_layer)
}

/// The signed-in user as remembered by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub role: Role,
    pub name: String,
}

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            name: user.display_name(),
        }
    }
}

pub async fn current_user(session: &Session) -> Result<Option<CurrentUser>, tower_sessions::session::Error> {
    session.get(SESSION_KEY_CURRENT_USER).await
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub artifacts: ArtifactStore,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let artifacts = ArtifactStore::from_config(&config);
        Self {
            pool,
            config,
            artifacts,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.pool.clone()
    }
}
