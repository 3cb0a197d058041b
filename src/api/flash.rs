//! One-shot notices carried across a redirect in the session.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::api::middleware::session::SESSION_KEY_FLASHES;
use crate::error::AppError;
use crate::services::license_workflow::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Warning,
    Danger,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: Level,
    pub message: String,
}

impl Flash {
    pub fn category(&self) -> &'static str {
        self.level.as_str()
    }
}

pub async fn push(
    session: &Session,
    level: Level,
    message: impl Into<String>,
) -> Result<(), tower_sessions::session::Error> {
    let mut flashes: Vec<Flash> = session.get(SESSION_KEY_FLASHES).await?.unwrap_or_default();
    flashes.push(Flash {
        level,
        message: message.into(),
    });
    session.insert(SESSION_KEY_FLASHES, flashes).await
}

/// Removes and returns pending notices.
pub async fn take(session: &Session) -> Result<Vec<Flash>, tower_sessions::session::Error> {
    Ok(session
        .remove::<Vec<Flash>>(SESSION_KEY_FLASHES)
        .await?
        .unwrap_or_default())
}

/// Splits workflow failures into notices for the user and real errors.
///
/// Permission, transition and staleness failures become a flash message;
/// database and artifact failures propagate.
pub fn user_notice(err: WorkflowError) -> Result<String, AppError> {
    match err {
        WorkflowError::Forbidden
        | WorkflowError::Transition(_)
        | WorkflowError::Stale
        | WorkflowError::PaymentRequired => Ok(err.to_string()),
        other => Err(other.into()),
    }
}
