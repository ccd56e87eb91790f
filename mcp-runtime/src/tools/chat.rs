use serde_json::{Value, json};

use crate::chat::{ChatMessage, DEFAULT_CHAT_MODEL};
use crate::registry::{RegistryError, ToolCall, ToolError, ToolRegistry, handler};
use crate::util::{
    arg_bool, arg_optional_u64, arg_string, required_object, required_object_array,
    required_string, to_pretty_json,
};

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        "create-chat-completion",
        "Create a conversational chat completion using Meilisearch's chat feature",
        json!({
            "type": "object",
            "properties": {
                "workspace_uid": {"type": "string", "description": "Chat workspace to use"},
                "messages": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "role": {"type": "string", "enum": ["system", "user", "assistant"]},
                            "content": {"type": "string"}
                        },
                        "required": ["role", "content"]
                    },
                    "description": "Chat history, oldest first"
                },
                "model": {"type": "string", "default": DEFAULT_CHAT_MODEL},
                "stream": {"type": "boolean", "default": true}
            },
            "required": ["workspace_uid", "messages"]
        }),
        handler(create_chat_completion),
    )?;
    registry.register(
        "get-chat-workspaces",
        "Get list of available chat workspaces",
        json!({
            "type": "object",
            "properties": {
                "offset": {"type": "integer", "minimum": 0},
                "limit": {"type": "integer", "minimum": 1}
            }
        }),
        handler(get_chat_workspaces),
    )?;
    registry.register(
        "get-chat-workspace-settings",
        "Get settings for a specific chat workspace",
        json!({
            "type": "object",
            "properties": {
                "workspace_uid": {"type": "string"}
            },
            "required": ["workspace_uid"]
        }),
        handler(get_chat_workspace_settings),
    )?;
    registry.register(
        "update-chat-workspace-settings",
        "Update settings for a specific chat workspace",
        json!({
            "type": "object",
            "properties": {
                "workspace_uid": {"type": "string"},
                "settings": {"type": "object"}
            },
            "required": ["workspace_uid", "settings"]
        }),
        handler(update_chat_workspace_settings),
    )?;
    Ok(())
}

fn to_messages(items: Vec<Value>) -> Result<Vec<ChatMessage>, ToolError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item)
                .map_err(|err| ToolError::invalid_argument(format!("messages[{index}]"), err.to_string()))
        })
        .collect()
}

async fn create_chat_completion(call: ToolCall) -> Result<String, ToolError> {
    let workspace_uid = required_string(&call.args, "workspace_uid")?;
    let messages = to_messages(required_object_array(&call.args, "messages")?)?;
    let model = arg_string(&call.args, "model", DEFAULT_CHAT_MODEL)?;
    let stream = arg_bool(&call.args, "stream", true)?;

    let response = call
        .context()?
        .chat()
        .create_chat_completion(&workspace_uid, &messages, &model, stream)
        .await?;
    Ok(format!("Chat completion response:\n{response}"))
}

async fn get_chat_workspaces(call: ToolCall) -> Result<String, ToolError> {
    let offset = arg_optional_u64(&call.args, "offset")?;
    let limit = arg_optional_u64(&call.args, "limit")?;
    let workspaces = call
        .context()?
        .chat()
        .get_chat_workspaces(offset, limit)
        .await?;
    Ok(format!("Chat workspaces:\n{}", to_pretty_json(&workspaces)))
}

async fn get_chat_workspace_settings(call: ToolCall) -> Result<String, ToolError> {
    let workspace_uid = required_string(&call.args, "workspace_uid")?;
    let settings = call
        .context()?
        .chat()
        .get_workspace_settings(&workspace_uid)
        .await?;
    Ok(format!(
        "Workspace settings for '{workspace_uid}':\n{}",
        to_pretty_json(&settings)
    ))
}

async fn update_chat_workspace_settings(call: ToolCall) -> Result<String, ToolError> {
    let workspace_uid = required_string(&call.args, "workspace_uid")?;
    let settings = required_object(&call.args, "settings")?;
    let updated = call
        .context()?
        .chat()
        .update_workspace_settings(&workspace_uid, &settings)
        .await?;
    Ok(format!(
        "Updated workspace settings for '{workspace_uid}':\n{}",
        to_pretty_json(&updated)
    ))
}
