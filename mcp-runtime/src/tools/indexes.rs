use serde_json::json;

use crate::registry::{RegistryError, ToolCall, ToolError, ToolRegistry, handler};
use crate::util::{arg_optional_string, arg_optional_u64, required_string, to_pretty_json};

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        "create-index",
        "Create a new Meilisearch index",
        json!({
            "type": "object",
            "properties": {
                "uid": {"type": "string", "description": "Unique identifier of the index"},
                "primaryKey": {"type": "string", "description": "Primary key field for documents"}
            },
            "required": ["uid"]
        }),
        handler(create_index),
    )?;
    registry.register(
        "list-indexes",
        "List all Meilisearch indexes",
        json!({
            "type": "object",
            "properties": {
                "offset": {"type": "integer", "minimum": 0},
                "limit": {"type": "integer", "minimum": 1}
            }
        }),
        handler(list_indexes),
    )?;
    registry.register(
        "delete-index",
        "Delete a Meilisearch index",
        json!({
            "type": "object",
            "properties": {
                "uid": {"type": "string", "description": "Unique identifier of the index to delete"}
            },
            "required": ["uid"]
        }),
        handler(delete_index),
    )?;
    Ok(())
}

async fn create_index(call: ToolCall) -> Result<String, ToolError> {
    let uid = required_string(&call.args, "uid")?;
    let primary_key = arg_optional_string(&call.args, "primaryKey")?;
    let task = call
        .context()?
        .meilisearch()
        .create_index(&uid, primary_key.as_deref())
        .await?;
    Ok(format!("Created index: {task}"))
}

async fn list_indexes(call: ToolCall) -> Result<String, ToolError> {
    let offset = arg_optional_u64(&call.args, "offset")?;
    let limit = arg_optional_u64(&call.args, "limit")?;
    let indexes = call
        .context()?
        .meilisearch()
        .list_indexes(offset, limit)
        .await?;
    Ok(format!("Indexes:\n{}", to_pretty_json(&indexes)))
}

async fn delete_index(call: ToolCall) -> Result<String, ToolError> {
    let uid = required_string(&call.args, "uid")?;
    call.context()?.meilisearch().delete_index(&uid).await?;
    tracing::info!(event = "index_deleted", index_uid = %uid, "Deleted index");
    Ok(format!("Successfully deleted index: {uid}"))
}
