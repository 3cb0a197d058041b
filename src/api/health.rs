use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::path::Path;
use std::time::Instant;

use crate::api::middleware::session::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub database: ServiceHealth,
    pub artifact_storage: ServiceHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    fn from_result<E: std::fmt::Display>(start: Instant, result: Result<(), E>) -> Self {
        match result {
            Ok(()) => ServiceHealth {
                status: "healthy".to_string(),
                response_time_ms: start.elapsed().as_millis(),
                error: None,
            },
            Err(e) => ServiceHealth {
                status: "unhealthy".to_string(),
                response_time_ms: start.elapsed().as_millis(),
                error: Some(e.to_string()),
            },
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Health check endpoint
/// Returns 200 if all dependencies are healthy, 503 if any are down
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();

    let db_health = check_database(&state.pool).await;
    let storage_health = check_artifact_storage(state.artifacts.root()).await;

    let all_healthy = db_health.is_healthy() && storage_health.is_healthy();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dependencies: DependencyStatus {
            database: db_health,
            artifact_storage: storage_health,
        },
    };

    tracing::info!(
        status = %response.status,
        duration_ms = start.elapsed().as_millis(),
        "Health check completed"
    );

    (status_code, Json(response))
}

/// Check database connectivity
async fn check_database(pool: &PgPool) -> ServiceHealth {
    let start = Instant::now();
    let result = sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
        .map_err(|e| format!("Database error: {}", e));

    ServiceHealth::from_result(start, result)
}

/// Check that the artifact directory exists (creating it if needed)
async fn check_artifact_storage(root: &Path) -> ServiceHealth {
    let start = Instant::now();
    let result = tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| format!("Artifact storage error: {}", e));

    ServiceHealth::from_result(start, result)
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_storage_check_creates_directory() {
        let root = std::env::temp_dir().join(format!("licensing-health-{}", uuid::Uuid::new_v4()));

        let health = check_artifact_storage(&root).await;
        assert!(health.is_healthy());
        assert!(root.is_dir());

        std::fs::remove_dir_all(&root).ok();
    }
}
