use serde_json::{Value, json};

use crate::registry::{RegistryError, ToolCall, ToolError, ToolRegistry, handler};
use crate::util::{arg_optional_string, arg_optional_u64, required_string, required_string_array};

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        "get-keys",
        "Get list of API keys",
        json!({
            "type": "object",
            "properties": {
                "offset": {"type": "integer", "minimum": 0},
                "limit": {"type": "integer", "minimum": 1}
            }
        }),
        handler(get_keys),
    )?;
    registry.register(
        "create-key",
        "Create a new API key",
        json!({
            "type": "object",
            "properties": {
                "actions": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Allowed actions, e.g. [\"search\", \"documents.add\"]"
                },
                "indexes": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Accessible indexes; [\"*\"] for all"
                },
                "description": {"type": "string"},
                "expiresAt": {"type": "string", "description": "RFC 3339 expiry date"}
            },
            "required": ["actions", "indexes"]
        }),
        handler(create_key),
    )?;
    registry.register(
        "delete-key",
        "Delete an API key",
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "The key or its uid"}
            },
            "required": ["key"]
        }),
        handler(delete_key),
    )?;
    Ok(())
}

async fn get_keys(call: ToolCall) -> Result<String, ToolError> {
    let offset = arg_optional_u64(&call.args, "offset")?;
    let limit = arg_optional_u64(&call.args, "limit")?;
    let keys = call.context()?.meilisearch().get_keys(offset, limit).await?;
    Ok(format!("API keys: {keys}"))
}

async fn create_key(call: ToolCall) -> Result<String, ToolError> {
    let mut options = json!({
        "actions": required_string_array(&call.args, "actions")?,
        "indexes": required_string_array(&call.args, "indexes")?,
    });
    if let Some(description) = arg_optional_string(&call.args, "description")? {
        options["description"] = Value::String(description);
    }
    if let Some(expires_at) = arg_optional_string(&call.args, "expiresAt")? {
        options["expiresAt"] = Value::String(expires_at);
    }
    let key = call.context()?.meilisearch().create_key(&options).await?;
    Ok(format!("Created API key: {key}"))
}

async fn delete_key(call: ToolCall) -> Result<String, ToolError> {
    let key = required_string(&call.args, "key")?;
    call.context()?.meilisearch().delete_key(&key).await?;
    Ok(format!("Successfully deleted API key: {key}"))
}
