use serde_json::{Map, Value, json};

use crate::registry::{RegistryError, ToolCall, ToolError, ToolRegistry, handler};
use crate::upstream::TaskQuery;
use crate::util::{
    arg_optional_bool, arg_optional_string, arg_optional_string_array, arg_optional_u64,
    arg_optional_u64_array, required_u64,
};

const LIST_FILTERS: [&str; 5] = ["batchUids", "canceledBy", "types", "statuses", "indexUids"];
const DATE_FILTERS: [&str; 6] = [
    "afterEnqueuedAt",
    "beforeEnqueuedAt",
    "afterStartedAt",
    "beforeStartedAt",
    "afterFinishedAt",
    "beforeFinishedAt",
];
const CANCEL_FILTERS: [&str; 4] = ["uids", "indexUids", "types", "statuses"];

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        "get-task",
        "Get information about a specific task",
        json!({
            "type": "object",
            "properties": {
                "taskUid": {"type": "integer", "minimum": 0}
            },
            "required": ["taskUid"]
        }),
        handler(get_task),
    )?;
    registry.register(
        "get-tasks",
        "Get list of tasks with optional filters",
        get_tasks_schema(),
        handler(get_tasks),
    )?;

    let mut cancel_properties = Map::new();
    for key in CANCEL_FILTERS {
        cancel_properties.insert(
            key.to_string(),
            json!({"type": "string", "description": "Comma-separated list"}),
        );
    }
    registry.register(
        "cancel-tasks",
        "Cancel tasks based on filters",
        json!({"type": "object", "properties": cancel_properties}),
        handler(cancel_tasks),
    )?;
    Ok(())
}

fn get_tasks_schema() -> Value {
    let mut properties = Map::new();
    properties.insert("limit".into(), json!({"type": "integer", "minimum": 1}));
    properties.insert(
        "from".into(),
        json!({"type": "integer", "minimum": 0, "description": "Task uid to start from"}),
    );
    properties.insert("reverse".into(), json!({"type": "boolean"}));
    properties.insert(
        "uids".into(),
        json!({"type": "array", "items": {"type": "integer"}}),
    );
    for key in LIST_FILTERS {
        properties.insert(
            key.to_string(),
            json!({"type": "array", "items": {"type": "string"}}),
        );
    }
    for key in DATE_FILTERS {
        properties.insert(
            key.to_string(),
            json!({"type": "string", "description": "RFC 3339 date"}),
        );
    }
    json!({"type": "object", "properties": properties})
}

async fn get_task(call: ToolCall) -> Result<String, ToolError> {
    let task_uid = required_u64(&call.args, "taskUid")?;
    let task = call.context()?.meilisearch().get_task(task_uid).await?;
    Ok(format!("Task information: {task}"))
}

fn task_filters(args: &Map<String, Value>) -> Result<TaskQuery, ToolError> {
    let mut query = TaskQuery::default();
    if let Some(limit) = arg_optional_u64(args, "limit")? {
        query.push("limit", limit);
    }
    if let Some(from) = arg_optional_u64(args, "from")? {
        query.push("from", from);
    }
    if let Some(reverse) = arg_optional_bool(args, "reverse")? {
        query.push("reverse", reverse);
    }
    if let Some(uids) = arg_optional_u64_array(args, "uids")? {
        query.push_list("uids", &uids);
    }
    for key in LIST_FILTERS {
        if let Some(values) = arg_optional_string_array(args, key)? {
            query.push_list(key, &values);
        }
    }
    for key in DATE_FILTERS {
        if let Some(value) = arg_optional_string(args, key)? {
            query.push(key, value);
        }
    }
    Ok(query)
}

async fn get_tasks(call: ToolCall) -> Result<String, ToolError> {
    let query = task_filters(&call.args)?;
    let tasks = call.context()?.meilisearch().get_tasks(&query).await?;
    Ok(format!("Tasks: {tasks}"))
}

async fn cancel_tasks(call: ToolCall) -> Result<String, ToolError> {
    let mut query = TaskQuery::default();
    for key in CANCEL_FILTERS {
        if let Some(value) = arg_optional_string(&call.args, key)? {
            let items: Vec<&str> = value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .collect();
            if !items.is_empty() {
                query.push_list(key, &items);
            }
        }
    }
    // Meilisearch refuses an unfiltered cancel; let it say so.
    let result = call.context()?.meilisearch().cancel_tasks(&query).await?;
    Ok(format!("Tasks cancelled: {result}"))
}
