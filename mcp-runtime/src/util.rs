use serde_json::{Map, Value};

use crate::registry::ToolError;

pub fn parse_response_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn to_compact_json(value: &impl serde::Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn invalid(key: &str, message: String) -> ToolError {
    ToolError::invalid_argument(key, message)
}

pub fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Err(invalid(key, "is required".to_string())),
        Some(Value::String(v)) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(Value::String(_)) => Err(invalid(key, "must not be empty".to_string())),
        Some(_) => Err(invalid(key, "must be a string".to_string())),
    }
}

pub fn arg_string(args: &Map<String, Value>, key: &str, default: &str) -> Result<String, ToolError> {
    Ok(arg_optional_string(args, key)?.unwrap_or_else(|| default.to_string()))
}

pub fn arg_optional_string(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(invalid(key, "must be a string".to_string())),
    }
}

/// Like [`arg_optional_string`] but keeps empty strings, for values where
/// "empty" carries meaning (clearing a credential).
pub fn arg_raw_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(invalid(key, "must be a string".to_string())),
    }
}

pub fn arg_bool(args: &Map<String, Value>, key: &str, default: bool) -> Result<bool, ToolError> {
    Ok(arg_optional_bool(args, key)?.unwrap_or(default))
}

pub fn arg_optional_bool(args: &Map<String, Value>, key: &str) -> Result<Option<bool>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(v)) => Ok(Some(*v)),
        Some(_) => Err(invalid(key, "must be a boolean".to_string())),
    }
}

pub fn arg_optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(key, "must be a non-negative integer".to_string())),
        Some(_) => Err(invalid(key, "must be a non-negative integer".to_string())),
    }
}

pub fn required_u64(args: &Map<String, Value>, key: &str) -> Result<u64, ToolError> {
    arg_optional_u64(args, key)?.ok_or_else(|| invalid(key, "is required".to_string()))
}

pub fn arg_optional_string_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, ToolError> {
    let Some(value) = args.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .ok_or_else(|| invalid(key, "must be an array of strings".to_string()))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| invalid(key, "items must be strings".to_string()))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

pub fn required_string_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Vec<String>, ToolError> {
    arg_optional_string_array(args, key)?.ok_or_else(|| invalid(key, "is required".to_string()))
}

pub fn arg_optional_u64_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<u64>>, ToolError> {
    let Some(value) = args.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .ok_or_else(|| invalid(key, "must be an array of integers".to_string()))?;
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .ok_or_else(|| invalid(key, "items must be non-negative integers".to_string()))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

pub fn required_object(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Map<String, Value>, ToolError> {
    match args.get(key) {
        Some(Value::Object(map)) => Ok(map.clone()),
        None | Some(Value::Null) => Err(invalid(key, "is required".to_string())),
        Some(_) => Err(invalid(key, "must be an object".to_string())),
    }
}

pub fn required_object_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Vec<Value>, ToolError> {
    match args.get(key) {
        Some(Value::Array(items)) => {
            if items.iter().all(Value::is_object) {
                Ok(items.clone())
            } else {
                Err(invalid(key, "items must be objects".to_string()))
            }
        }
        None | Some(Value::Null) => Err(invalid(key, "is required".to_string())),
        Some(_) => Err(invalid(key, "must be an array of objects".to_string())),
    }
}
