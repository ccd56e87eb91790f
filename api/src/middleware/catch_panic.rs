use std::any::Any;

use axum::response::Response;
use axum::http::StatusCode;
use meilisearch_mcp_core::ProtocolError;
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::rpc_error;

type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

/// Turns a handler panic into a `-32603` envelope with HTTP 500.
pub fn layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(panic_response as PanicHandler)
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "handler panicked".to_string()
    };
    tracing::error!(event = "http_handler_panicked", detail = %detail, "Request handler panicked");
    rpc_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        Value::Null,
        &ProtocolError::internal(detail),
    )
}
