use serde_json::json;

use crate::registry::{RegistryError, ToolCall, ToolError, ToolRegistry, handler};
use crate::util::{arg_optional_string, arg_raw_string};

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        "get-connection-settings",
        "Get current Meilisearch connection settings",
        json!({"type": "object", "properties": {}}),
        handler(get_connection_settings),
    )?;
    registry.register(
        "update-connection-settings",
        "Update Meilisearch connection settings",
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "New Meilisearch server URL"},
                "api_key": {"type": "string", "description": "New API key; an empty string clears it"}
            }
        }),
        handler(update_connection_settings),
    )?;
    Ok(())
}

async fn get_connection_settings(call: ToolCall) -> Result<String, ToolError> {
    let ctx = call.context()?;
    let api_key = if ctx.has_api_key() { "********" } else { "Not set" };
    Ok(format!(
        "Current connection settings:\nURL: {}\nAPI Key: {api_key}",
        ctx.url()
    ))
}

async fn update_connection_settings(call: ToolCall) -> Result<String, ToolError> {
    let url = arg_optional_string(&call.args, "url")?;
    let api_key = arg_raw_string(&call.args, "api_key")?;
    let ctx = call
        .session
        .reconfigure(url.as_deref(), api_key.as_deref())?;
    Ok(format!(
        "Successfully updated connection settings to URL: {}",
        ctx.url()
    ))
}
