use serde_json::json;

use crate::registry::{RegistryError, ToolCall, ToolError, ToolRegistry, handler};
use crate::util::{
    arg_optional_string, arg_optional_u64, required_object_array, required_string, to_pretty_json,
};

const DEFAULT_OFFSET: u64 = 0;
const DEFAULT_LIMIT: u64 = 20;

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        "get-documents",
        "Get documents from an index",
        json!({
            "type": "object",
            "properties": {
                "indexUid": {"type": "string"},
                "offset": {"type": "integer", "minimum": 0, "default": DEFAULT_OFFSET},
                "limit": {"type": "integer", "minimum": 1, "default": DEFAULT_LIMIT}
            },
            "required": ["indexUid"]
        }),
        handler(get_documents),
    )?;
    registry.register(
        "add-documents",
        "Add or replace documents in an index",
        json!({
            "type": "object",
            "properties": {
                "indexUid": {"type": "string"},
                "documents": {"type": "array", "items": {"type": "object"}},
                "primaryKey": {"type": "string"}
            },
            "required": ["indexUid", "documents"]
        }),
        handler(add_documents),
    )?;
    Ok(())
}

async fn get_documents(call: ToolCall) -> Result<String, ToolError> {
    let index_uid = required_string(&call.args, "indexUid")?;
    let offset = arg_optional_u64(&call.args, "offset")?.unwrap_or(DEFAULT_OFFSET);
    let limit = arg_optional_u64(&call.args, "limit")?.unwrap_or(DEFAULT_LIMIT);
    let documents = call
        .context()?
        .meilisearch()
        .get_documents(&index_uid, offset, limit)
        .await?;
    Ok(format!("Documents:\n{}", to_pretty_json(&documents)))
}

async fn add_documents(call: ToolCall) -> Result<String, ToolError> {
    let index_uid = required_string(&call.args, "indexUid")?;
    let documents = required_object_array(&call.args, "documents")?;
    let primary_key = arg_optional_string(&call.args, "primaryKey")?;
    let task = call
        .context()?
        .meilisearch()
        .add_documents(&index_uid, &documents, primary_key.as_deref())
        .await?;
    Ok(format!("Added documents: {task}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::extract::{Path, Query};
    use axum::routing::{post, put};
    use axum::{Json, Router};
    use serde_json::{Map, Value, json};

    use crate::context::{ConnectionSettings, ContextHandle};
    use crate::tools::build_registry;
    use crate::upstream::test_support::spawn_upstream;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn get_documents_applies_default_paging() {
        let router = Router::new().route(
            "/indexes/{uid}/documents/fetch",
            post(|Path(uid): Path<String>, Json(body): Json<Value>| async move {
                Json(json!({"index": uid, "offset": body["offset"], "limit": body["limit"], "results": []}))
            }),
        );
        let base = spawn_upstream(router).await;
        let registry = build_registry(Arc::new(ContextHandle::new(ConnectionSettings::new(
            base, None,
        ))))
        .expect("registry");

        let result = registry
            .call("get-documents", args(json!({"indexUid": "movies"})))
            .await;
        let text = result.first_text().expect("text");
        let body: Value =
            serde_json::from_str(text.strip_prefix("Documents:\n").expect("prefix")).expect("json");
        assert_eq!(body["offset"], 0);
        assert_eq!(body["limit"], 20);
        assert_eq!(body["index"], "movies");
    }

    #[tokio::test]
    async fn add_documents_puts_with_primary_key() {
        let router = Router::new().route(
            "/indexes/{uid}/documents",
            put(
                |Query(query): Query<HashMap<String, String>>, Json(docs): Json<Vec<Value>>| async move {
                    Json(json!({"taskUid": 7, "primaryKey": query.get("primaryKey"), "received": docs.len()}))
                },
            ),
        );
        let base = spawn_upstream(router).await;
        let registry = build_registry(Arc::new(ContextHandle::new(ConnectionSettings::new(
            base, None,
        ))))
        .expect("registry");

        let result = registry
            .call(
                "add-documents",
                args(json!({
                    "indexUid": "movies",
                    "documents": [{"id": 1}, {"id": 2}],
                    "primaryKey": "id"
                })),
            )
            .await;
        assert_eq!(
            result.first_text(),
            Some(r#"Added documents: {"primaryKey":"id","received":2,"taskUid":7}"#)
        );
    }

    #[tokio::test]
    async fn non_object_documents_are_rejected() {
        let registry = build_registry(Arc::new(ContextHandle::new(ConnectionSettings::default())))
            .expect("registry");
        let result = registry
            .call("add-documents", args(json!({"indexUid": "m", "documents": [1, 2]})))
            .await;
        assert_eq!(
            result.first_text(),
            Some("Error: Invalid argument 'documents[0]': must be of type object")
        );
    }
}
