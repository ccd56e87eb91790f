use serde_json::json;

use crate::registry::{RegistryError, ToolCall, ToolError, ToolRegistry, handler};
use crate::util::{required_object, required_string};

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        "get-settings",
        "Get current settings for an index",
        json!({
            "type": "object",
            "properties": {
                "indexUid": {"type": "string"}
            },
            "required": ["indexUid"]
        }),
        handler(get_settings),
    )?;
    registry.register(
        "update-settings",
        "Update settings for an index",
        json!({
            "type": "object",
            "properties": {
                "indexUid": {"type": "string"},
                "settings": {
                    "type": "object",
                    "description": "Settings to change; omitted settings are left untouched"
                }
            },
            "required": ["indexUid", "settings"]
        }),
        handler(update_settings),
    )?;
    Ok(())
}

async fn get_settings(call: ToolCall) -> Result<String, ToolError> {
    let index_uid = required_string(&call.args, "indexUid")?;
    let settings = call.context()?.meilisearch().get_settings(&index_uid).await?;
    Ok(format!("Current settings: {settings}"))
}

async fn update_settings(call: ToolCall) -> Result<String, ToolError> {
    let index_uid = required_string(&call.args, "indexUid")?;
    let settings = required_object(&call.args, "settings")?;
    let task = call
        .context()?
        .meilisearch()
        .update_settings(&index_uid, &settings)
        .await?;
    Ok(format!("Settings updated: {task}"))
}
