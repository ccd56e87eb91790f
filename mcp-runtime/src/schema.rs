//! Input-schema normalization and argument checking for tool descriptors.
//!
//! Published schemas are restricted to a small JSON-Schema subset because
//! several MCP clients reject anything else.

use serde_json::{Map, Value, json};

use crate::registry::ToolError;

const PERMITTED_KEYWORDS: [&str; 10] = [
    "type",
    "properties",
    "required",
    "additionalProperties",
    "items",
    "description",
    "enum",
    "default",
    "minimum",
    "maximum",
];

/// Root schemas are always closed objects; nested objects are closed when
/// they declare their properties and left open otherwise.
pub fn normalize_input_schema(schema: &Value) -> Value {
    let mut normalized = normalize_node(schema);
    if let Value::Object(map) = &mut normalized {
        map.insert("type".to_string(), json!("object"));
        map.entry("properties").or_insert_with(|| json!({}));
        map.insert("additionalProperties".to_string(), Value::Bool(false));
    }
    normalized
}

fn normalize_node(schema: &Value) -> Value {
    let Value::Object(source) = schema else {
        return json!({});
    };

    let mut out = Map::new();
    for (key, value) in source {
        if !PERMITTED_KEYWORDS.contains(&key.as_str()) {
            continue;
        }
        let value = match key.as_str() {
            "properties" => match value {
                Value::Object(props) => Value::Object(
                    props
                        .iter()
                        .map(|(name, prop)| (name.clone(), normalize_node(prop)))
                        .collect(),
                ),
                _ => json!({}),
            },
            "items" => normalize_node(value),
            "additionalProperties" => Value::Bool(value.as_bool().unwrap_or(false)),
            _ => value.clone(),
        };
        out.insert(key.clone(), value);
    }

    if out.get("type").and_then(Value::as_str) == Some("array") {
        out.entry("items").or_insert_with(|| json!({}));
    }
    if out.contains_key("properties") {
        out.insert("additionalProperties".to_string(), Value::Bool(false));
    }
    Value::Object(out)
}

/// Checks `args` against a normalized input schema.
pub fn validate_arguments(schema: &Value, args: &Map<String, Value>) -> Result<(), ToolError> {
    validate_object("", schema, args)
}

fn validate_object(prefix: &str, schema: &Value, args: &Map<String, Value>) -> Result<(), ToolError> {
    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if args.get(field).is_none_or(Value::is_null) {
                return Err(ToolError::invalid_argument(
                    join_path(prefix, field),
                    "is required",
                ));
            }
        }
    }

    for (key, value) in args {
        let path = join_path(prefix, key);
        let Some(prop) = properties.and_then(|p| p.get(key)) else {
            if closed {
                return Err(ToolError::invalid_argument(path, "is not a recognized argument"));
            }
            continue;
        };
        if value.is_null() {
            continue;
        }
        validate_value(&path, prop, value)?;
    }
    Ok(())
}

fn validate_value(path: &str, schema: &Value, value: &Value) -> Result<(), ToolError> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        let matches = match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !matches {
            return Err(ToolError::invalid_argument(
                path,
                format!("must be of type {expected}"),
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(ToolError::invalid_argument(
                path,
                format!("must be one of {}", Value::Array(allowed.clone())),
            ));
        }
    }

    match value {
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (index, item) in items.iter().enumerate() {
                    validate_value(&format!("{path}[{index}]"), item_schema, item)?;
                }
            }
        }
        Value::Object(map) if schema.get("properties").is_some() => {
            validate_object(path, schema, map)?;
        }
        _ => {}
    }
    Ok(())
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn normalize_closes_root_and_fills_array_items() {
        let raw = json!({
            "type": "object",
            "title": "ignored",
            "properties": {
                "sort": {"type": "array", "description": "attributes"},
                "settings": {"type": "object"},
                "messages": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"role": {"type": "string"}},
                        "x-custom": true
                    }
                }
            },
            "required": ["sort"]
        });

        let schema = normalize_input_schema(&raw);
        assert_eq!(schema["additionalProperties"], false);
        assert!(schema.get("title").is_none());
        assert_eq!(schema["properties"]["sort"]["items"], json!({}));
        assert!(schema["properties"]["settings"].get("additionalProperties").is_none());
        let item = &schema["properties"]["messages"]["items"];
        assert_eq!(item["additionalProperties"], false);
        assert!(item.get("x-custom").is_none());
        assert_eq!(schema["required"], json!(["sort"]));
    }

    #[test]
    fn normalize_handles_empty_schema() {
        let schema = normalize_input_schema(&json!({}));
        assert_eq!(
            schema,
            json!({"type": "object", "properties": {}, "additionalProperties": false})
        );
    }

    fn search_schema() -> Value {
        normalize_input_schema(&json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"},
                "sort": {"type": "array", "items": {"type": "string"}},
                "mode": {"type": "string", "enum": ["fast", "full"]},
                "messages": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"role": {"type": "string"}, "content": {"type": "string"}},
                        "required": ["role", "content"]
                    }
                }
            },
            "required": ["query"]
        }))
    }

    #[test]
    fn validate_accepts_well_formed_arguments() {
        let schema = search_schema();
        validate_arguments(
            &schema,
            &args(json!({
                "query": "alien",
                "limit": 5,
                "sort": ["year:desc"],
                "mode": "fast",
                "messages": [{"role": "user", "content": "hi"}]
            })),
        )
        .expect("all declared arguments");

        validate_arguments(
            &schema,
            &args(json!({"query": "alien", "limit": null, "sort": ["year:desc"]})),
        )
        .expect("valid arguments");
    }

    #[test]
    fn validate_reports_the_offending_field() {
        let schema = search_schema();
        let cases = [
            (json!({}), "query"),
            (json!({"query": null}), "query"),
            (json!({"query": "a", "limit": "5"}), "limit"),
            (json!({"query": "a", "limit": 1.5}), "limit"),
            (json!({"query": "a", "sort": [1]}), "sort[0]"),
            (json!({"query": "a", "mode": "slow"}), "mode"),
            (json!({"query": "a", "messages": [{"role": "user"}]}), "messages[0].content"),
            (json!({"query": "a", "unknown": true}), "unknown"),
        ];
        for (input, field) in cases {
            let err = validate_arguments(&schema, &args(input.clone()))
                .expect_err("invalid arguments must be rejected");
            assert!(
                err.to_string().contains(&format!("'{field}'")),
                "{input} -> {err}"
            );
        }
    }
}
