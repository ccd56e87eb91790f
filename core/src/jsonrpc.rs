use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

pub const JSONRPC_VERSION: &str = "2.0";

/// An inbound JSON-RPC call.
///
/// `id` distinguishes three cases that serde's `Option` handling would
/// collapse: absent (`None`, a notification), explicit `null`
/// (`Some(Value::Null)`), and any other scalar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

/// A request that failed envelope validation, with whatever id could be
/// recovered so the error can still be correlated.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRequest {
    pub id: Value,
    pub error: ProtocolError,
}

impl RejectedRequest {
    pub fn into_response(self) -> JsonRpcResponse {
        JsonRpcResponse::failure(self.id, &self.error)
    }
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// The id to echo back; notifications answer with `null`.
    pub fn response_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }

    /// Params as an object map. `null` or absent params read as empty.
    pub fn params_object(&self) -> Result<Map<String, Value>, ProtocolError> {
        match &self.params {
            Value::Null => Ok(Map::new()),
            Value::Object(map) => Ok(map.clone()),
            _ => Err(ProtocolError::invalid_params("params must be an object")),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, RejectedRequest> {
        let Value::Object(mut obj) = value else {
            return Err(RejectedRequest {
                id: Value::Null,
                error: ProtocolError::invalid_request("request must be a JSON object"),
            });
        };

        let id = obj.remove("id");
        let echo_id = match &id {
            None => Value::Null,
            Some(v) if is_valid_id(v) => v.clone(),
            Some(_) => {
                return Err(RejectedRequest {
                    id: Value::Null,
                    error: ProtocolError::invalid_request(
                        "id must be a string, a number or null",
                    ),
                });
            }
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(RejectedRequest {
                id: echo_id,
                error: ProtocolError::invalid_request("jsonrpc must be '2.0'"),
            });
        }

        let method = match obj.remove("method") {
            Some(Value::String(method)) if !method.is_empty() => method,
            _ => {
                return Err(RejectedRequest {
                    id: echo_id,
                    error: ProtocolError::invalid_request("method must be a non-empty string"),
                });
            }
        };

        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method,
            params: obj.remove("params").unwrap_or(Value::Null),
        })
    }
}

fn is_valid_id(value: &Value) -> bool {
    matches!(value, Value::Null | Value::String(_) | Value::Number(_))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An outbound JSON-RPC response. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: &ProtocolError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(ErrorObject {
                code: error.code(),
                message: error.to_string(),
                data: None,
            }),
        }
    }

    pub fn from_result(id: Value, result: Result<Value, ProtocolError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(err) => Self::failure(id, &err),
        }
    }

    pub fn error_code(&self) -> Option<i64> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Best-effort recovery of a top-level `"id"` scalar from text that is not
/// valid JSON as a whole (for example a truncated line).
pub fn salvage_id(raw: &str) -> Option<Value> {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let bytes = trimmed.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            b'"' if depth == 1 && trimmed[i..].starts_with("\"id\"") => {
                if let Some(id) = read_scalar_after_key(&trimmed[i + 4..]) {
                    return Some(id);
                }
                in_string = true;
            }
            b'"' => in_string = true,
            _ => {}
        }
        i += 1;
    }
    None
}

fn read_scalar_after_key(rest: &str) -> Option<Value> {
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
    match stream.next()? {
        Ok(value) if is_valid_id(&value) => Some(value),
        _ => None,
    }
}
