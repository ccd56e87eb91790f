use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::middleware::cors::preflight;
use crate::state::AppState;

pub const SERVICE_NAME: &str = "meilisearch-mcp";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check).options(preflight))
        .route("/ready", get(health_check).options(preflight))
}

/// Liveness probe: healthy only while the upstream answers its health
/// endpoint within the configured timeout.
pub async fn health_check(State(state): State<AppState>) -> Response {
    let context = match state.server.session().get() {
        Ok(context) => context,
        Err(err) => {
            tracing::warn!(event = "health_check_failed", error = %err, "Health check failed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "error",
                    service: SERVICE_NAME,
                    error: Some(err.to_string()),
                }),
            )
                .into_response();
        }
    };

    let (status, http_status) = if context.meilisearch().is_healthy().await {
        ("healthy", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        http_status,
        Json(HealthResponse {
            status,
            service: SERVICE_NAME,
            error: None,
        }),
    )
        .into_response()
}
