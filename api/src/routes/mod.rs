pub mod health;
pub mod mcp_http;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::middleware;
use crate::state::AppState;

/// The full HTTP surface: message and event-stream endpoints, health probes,
/// CORS and panic containment.
pub fn router(state: AppState) -> Router {
    let cors_layer = middleware::cors::build_cors_layer(&state.settings.cors_origins);

    Router::new()
        .merge(health::router())
        .merge(mcp_http::router())
        .layer(DefaultBodyLimit::max(state.settings.max_request_size))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer)
                .layer(middleware::catch_panic::layer()),
        )
        .with_state(state)
}
