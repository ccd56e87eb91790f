use axum::Json;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use meilisearch_mcp_core::error::codes;
use meilisearch_mcp_core::{JsonRpcResponse, ProtocolError};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP server failed: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP status for a JSON-RPC envelope. Protocol-level failures of a
/// well-formed call (unknown method, bad params) still travel as 200.
pub fn status_for(response: &JsonRpcResponse) -> StatusCode {
    match response.error_code() {
        None | Some(codes::METHOD_NOT_FOUND) | Some(codes::INVALID_PARAMS) => StatusCode::OK,
        Some(codes::PARSE_ERROR) | Some(codes::INVALID_REQUEST) => StatusCode::BAD_REQUEST,
        Some(codes::UNAUTHORIZED) => StatusCode::UNAUTHORIZED,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serializes an envelope. If that fails, answers with a plain-text 500
/// instead of letting the failure escape.
pub fn rpc_response(status: StatusCode, response: &JsonRpcResponse) -> Response {
    match serde_json::to_vec(response) {
        Ok(body) => (
            status,
            [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(event = "rpc_response_encode_failed", error = %err, "Failed to encode response");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

pub fn rpc_error(status: StatusCode, id: Value, error: &ProtocolError) -> Response {
    rpc_response(status, &JsonRpcResponse::failure(id, error))
}

pub fn unauthorized_rpc() -> Response {
    rpc_error(StatusCode::UNAUTHORIZED, Value::Null, &ProtocolError::Unauthorized)
}

/// The event-stream endpoint answers outside JSON-RPC framing.
pub fn unauthorized_plain() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized" })),
    )
        .into_response()
}
