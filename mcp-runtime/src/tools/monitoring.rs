use serde_json::json;

use crate::registry::{RegistryError, ToolCall, ToolError, ToolRegistry, handler};
use crate::util::{required_string, to_compact_json};

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    let no_args = json!({"type": "object", "properties": {}});
    registry.register(
        "health-check",
        "Check Meilisearch server health",
        no_args.clone(),
        handler(health_check),
    )?;
    registry.register(
        "get-version",
        "Get Meilisearch version information",
        no_args.clone(),
        handler(get_version),
    )?;
    registry.register(
        "get-stats",
        "Get database statistics",
        no_args.clone(),
        handler(get_stats),
    )?;
    registry.register(
        "get-health-status",
        "Get comprehensive health status of Meilisearch",
        no_args.clone(),
        handler(get_health_status),
    )?;
    registry.register(
        "get-index-metrics",
        "Get detailed metrics for an index",
        json!({
            "type": "object",
            "properties": {
                "indexUid": {"type": "string", "description": "Index to inspect"}
            },
            "required": ["indexUid"]
        }),
        handler(get_index_metrics),
    )?;
    registry.register(
        "get-system-info",
        "Get system-level information",
        no_args,
        handler(get_system_info),
    )?;
    Ok(())
}

async fn health_check(call: ToolCall) -> Result<String, ToolError> {
    let ctx = call.context()?;
    let status = if ctx.meilisearch().is_healthy().await {
        "available"
    } else {
        "unavailable"
    };
    Ok(format!("Meilisearch is {status}"))
}

async fn get_version(call: ToolCall) -> Result<String, ToolError> {
    let version = call.context()?.meilisearch().version().await?;
    Ok(format!("Version info: {version}"))
}

async fn get_stats(call: ToolCall) -> Result<String, ToolError> {
    let stats = call.context()?.meilisearch().stats().await?;
    Ok(format!("Database stats: {stats}"))
}

async fn get_health_status(call: ToolCall) -> Result<String, ToolError> {
    let status = call.context()?.meilisearch().health_status().await?;
    tracing::info!(
        event = "health_status_checked",
        indexes = status.indexes_count,
        "Health status checked"
    );
    Ok(format!("Health status: {}", to_compact_json(&status)))
}

async fn get_index_metrics(call: ToolCall) -> Result<String, ToolError> {
    let index_uid = required_string(&call.args, "indexUid")?;
    let metrics = call.context()?.meilisearch().index_metrics(&index_uid).await?;
    Ok(format!("Index metrics: {}", to_compact_json(&metrics)))
}

async fn get_system_info(call: ToolCall) -> Result<String, ToolError> {
    let info = call.context()?.meilisearch().system_information().await?;
    Ok(format!("System information: {info}"))
}
