use serde_json::json;

use crate::registry::{RegistryError, ToolCall, ToolError, ToolRegistry, handler};
use crate::upstream::SearchRequest;
use crate::util::{
    arg_optional_string, arg_optional_string_array, arg_optional_u64, arg_raw_string,
    to_pretty_json,
};

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        "search",
        "Search through Meilisearch indices. If indexUid is not provided, it will search across all indices.",
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query"},
                "indexUid": {"type": "string", "description": "Index to search; all indexes when omitted"},
                "limit": {"type": "integer", "minimum": 1, "default": 20},
                "offset": {"type": "integer", "minimum": 0, "default": 0},
                "filter": {"type": "string", "description": "Filter expression"},
                "sort": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Sort rules such as \"price:asc\""
                }
            },
            "required": ["query"]
        }),
        handler(search),
    )?;
    Ok(())
}

async fn search(call: ToolCall) -> Result<String, ToolError> {
    // An empty query is a valid placeholder search.
    let query = arg_raw_string(&call.args, "query")?
        .ok_or_else(|| ToolError::invalid_argument("query", "is required"))?;

    let mut request = SearchRequest::new(query.clone());
    if let Some(limit) = arg_optional_u64(&call.args, "limit")? {
        request.limit = limit;
    }
    if let Some(offset) = arg_optional_u64(&call.args, "offset")? {
        request.offset = offset;
    }
    request.filter = arg_optional_string(&call.args, "filter")?;
    request.sort = arg_optional_string_array(&call.args, "sort")?;

    let ctx = call.context()?;
    let results = match arg_optional_string(&call.args, "indexUid")? {
        Some(index_uid) => ctx.meilisearch().search_index(&index_uid, &request).await?,
        None => ctx.meilisearch().search_all(&request).await?,
    };
    Ok(format!(
        "Search results for '{query}':\n{}",
        to_pretty_json(&results)
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::Path;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Map, Value, json};

    use crate::context::{ConnectionSettings, ContextHandle};
    use crate::tools::build_registry;
    use crate::upstream::test_support::spawn_upstream;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    fn parse_results(text: &str, query: &str) -> Value {
        let prefix = format!("Search results for '{query}':\n");
        serde_json::from_str(text.strip_prefix(&prefix).expect("prefix")).expect("json")
    }

    #[tokio::test]
    async fn single_index_search_forwards_options() {
        let router = Router::new().route(
            "/indexes/{uid}/search",
            post(|Path(uid): Path<String>, Json(body): Json<Value>| async move {
                Json(json!({"index": uid, "request": body, "hits": []}))
            }),
        );
        let base = spawn_upstream(router).await;
        let registry = build_registry(Arc::new(ContextHandle::new(ConnectionSettings::new(
            base, None,
        ))))
        .expect("registry");

        let result = registry
            .call(
                "search",
                args(json!({
                    "query": "dune",
                    "indexUid": "books",
                    "limit": 5,
                    "filter": "year > 1960",
                    "sort": ["year:asc"]
                })),
            )
            .await;
        let body = parse_results(result.first_text().expect("text"), "dune");
        assert_eq!(body["index"], "books");
        assert_eq!(body["request"]["q"], "dune");
        assert_eq!(body["request"]["limit"], 5);
        assert_eq!(body["request"]["offset"], 0);
        assert_eq!(body["request"]["filter"], "year > 1960");
        assert_eq!(body["request"]["sort"], json!(["year:asc"]));
    }

    #[tokio::test]
    async fn search_without_index_keeps_indexes_with_hits() {
        let router = Router::new()
            .route(
                "/indexes",
                get(|| async { Json(json!({"results": [{"uid": "books"}, {"uid": "films"}]})) }),
            )
            .route(
                "/indexes/{uid}/search",
                post(|Path(uid): Path<String>| async move {
                    let hits = if uid == "books" { json!([{"id": 1}]) } else { json!([]) };
                    Json(json!({"hits": hits}))
                }),
            );
        let base = spawn_upstream(router).await;
        let registry = build_registry(Arc::new(ContextHandle::new(ConnectionSettings::new(
            base, None,
        ))))
        .expect("registry");

        let result = registry.call("search", args(json!({"query": "dune"}))).await;
        let body = parse_results(result.first_text().expect("text"), "dune");
        assert_eq!(body["multi_index"], true);
        assert_eq!(body["query"], "dune");
        assert!(body["results"].get("books").is_some());
        assert!(body["results"].get("films").is_none());
    }
}
