use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::Instrument;

use crate::context::{ContextError, ContextHandle, SessionContext};
use crate::schema::{normalize_input_schema, validate_arguments};
use crate::upstream::UpstreamError;

/// Why a tool call produced an error message instead of a result.
///
/// Never surfaces as a JSON-RPC error; see [`ToolRegistry::call`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid argument '{field}': {message}")]
    InvalidArgument { field: String, message: String },
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
        }
    }
}

/// The `result` of a `tools/call` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            content: vec![Content::text(format!("Error: {message}"))],
            is_error: true,
        }
    }

    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(Content::as_text)
    }
}

/// What a handler receives: the validated arguments and the session owner.
#[derive(Clone)]
pub struct ToolCall {
    pub session: Arc<ContextHandle>,
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn context(&self) -> Result<Arc<SessionContext>, ToolError> {
        Ok(self.session.get()?)
    }
}

pub type ToolFuture = BoxFuture<'static, Result<String, ToolError>>;
pub type ToolHandler = Arc<dyn Fn(ToolCall) -> ToolFuture + Send + Sync>;

/// Wraps an async function as a [`ToolHandler`].
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(ToolCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
{
    Arc::new(move |call| Box::pin(f(call)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

struct ToolEntry {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
}

/// Tool name to handler map, fixed after startup.
pub struct ToolRegistry {
    session: Arc<ContextHandle>,
    entries: Vec<ToolEntry>,
    by_name: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.by_name.len())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new(session: Arc<ContextHandle>) -> Self {
        Self {
            session,
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn session(&self) -> &Arc<ContextHandle> {
        &self.session
    }

    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        input_schema: Value,
        handler: ToolHandler,
    ) -> Result<(), RegistryError> {
        if self.by_name.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.by_name.insert(name.to_string(), self.entries.len());
        self.entries.push(ToolEntry {
            descriptor: ToolDescriptor {
                name: name.to_string(),
                description: description.to_string(),
                input_schema: normalize_input_schema(&input_schema),
            },
            handler,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Descriptors in registration order. Each call starts a fresh pass.
    pub fn list(&self) -> impl Iterator<Item = &ToolDescriptor> + '_ {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    /// Validates `args` and runs the handler.
    pub async fn invoke(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<Vec<Content>, ToolError> {
        let entry = self
            .by_name
            .get(name)
            .map(|&index| &self.entries[index])
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        validate_arguments(&entry.descriptor.input_schema, &args)?;

        let call = ToolCall {
            session: Arc::clone(&self.session),
            args,
        };
        // Nested under the session span when the upstream context resolves;
        // a context failure is reported by the handler itself.
        let span = match self.session.get() {
            Ok(context) => tracing::info_span!(parent: context.span(), "tool_call", tool = %name),
            Err(_) => tracing::info_span!("tool_call", tool = %name),
        };
        let text = (entry.handler)(call).instrument(span).await?;
        Ok(vec![Content::text(text)])
    }

    /// [`invoke`](Self::invoke) with failures folded into an
    /// `"Error: ..."` text result.
    pub async fn call(&self, name: &str, args: Map<String, Value>) -> ToolCallResult {
        match self.invoke(name, args).await {
            Ok(content) => ToolCallResult::success(content),
            Err(err) => {
                tracing::warn!(event = "tool_call_failed", tool = %name, error = %err, "Tool call failed");
                ToolCallResult::error(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConnectionSettings;
    use serde_json::json;

    fn session() -> Arc<ContextHandle> {
        Arc::new(ContextHandle::new(ConnectionSettings::new(
            "http://127.0.0.1:9",
            None,
        )))
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new(session());
        registry
            .register(
                "echo",
                "Echo a message",
                json!({
                    "type": "object",
                    "properties": {
                        "message": {"type": "string"},
                        "tags": {"type": "array"}
                    },
                    "required": ["message"]
                }),
                handler(|call: ToolCall| async move {
                    let message = call.args["message"].as_str().unwrap_or_default().to_string();
                    Ok(format!("echo: {message}"))
                }),
            )
            .expect("first registration");
        registry
            .register(
                "fail",
                "Always fails",
                json!({"type": "object", "properties": {}}),
                handler(|_call: ToolCall| async move {
                    Err::<String, _>(ToolError::internal("upstream exploded"))
                }),
            )
            .expect("second registration");
        registry
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn duplicate_names_fail_at_registration() {
        let mut registry = echo_registry();
        let err = registry
            .register(
                "echo",
                "again",
                json!({}),
                handler(|_call: ToolCall| async move { Ok(String::new()) }),
            )
            .expect_err("duplicate must fail");
        assert_eq!(err, RegistryError::Duplicate("echo".to_string()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn list_is_ordered_restartable_and_normalized() {
        let registry = echo_registry();
        let first: Vec<_> = registry.list().cloned().collect();
        let second: Vec<_> = registry.list().cloned().collect();
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            ["echo", "fail"]
        );

        for descriptor in &first {
            let schema = &descriptor.input_schema;
            assert_eq!(schema["additionalProperties"], false);
            for prop in schema["properties"].as_object().expect("properties").values() {
                if prop["type"] == "array" {
                    assert!(prop.get("items").is_some());
                }
            }
        }
    }

    #[test]
    fn descriptor_serializes_with_camel_case_schema_key() {
        let registry = echo_registry();
        let value = serde_json::to_value(registry.list().next().expect("echo")).expect("json");
        assert!(value.get("inputSchema").is_some());
    }

    #[tokio::test]
    async fn invoke_runs_the_handler() {
        let registry = echo_registry();
        let content = registry
            .invoke("echo", args(json!({"message": "hi"})))
            .await
            .expect("echo succeeds");
        assert_eq!(content, vec![Content::text("echo: hi")]);
    }

    #[tokio::test]
    async fn unknown_tool_folds_into_error_text() {
        let registry = echo_registry();
        let result = registry.call("does-not-exist", Map::new()).await;
        assert!(result.is_error);
        assert_eq!(
            result.first_text(),
            Some("Error: Unknown tool: does-not-exist")
        );
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_handler() {
        let registry = echo_registry();
        let result = registry.call("echo", args(json!({"message": 42}))).await;
        let text = result.first_text().expect("text");
        assert!(text.starts_with("Error: Invalid argument 'message'"), "{text}");
    }

    #[tokio::test]
    async fn handler_failures_become_error_text() {
        let registry = echo_registry();
        let result = registry.call("fail", Map::new()).await;
        assert_eq!(result.first_text(), Some("Error: upstream exploded"));

        let value = serde_json::to_value(&result).expect("json");
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["isError"], true);
    }

    #[tokio::test]
    async fn successful_results_omit_is_error() {
        let registry = echo_registry();
        let result = registry.call("echo", args(json!({"message": "x"}))).await;
        let value = serde_json::to_value(&result).expect("json");
        assert!(value.get("isError").is_none());
    }

    #[derive(Clone, Default)]
    struct SpanParents(Arc<std::sync::Mutex<Vec<(String, Option<String>)>>>);

    impl<S> tracing_subscriber::Layer<S> for SpanParents
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            id: &tracing::span::Id,
            ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let parent = ctx
                .span(id)
                .and_then(|span| span.parent())
                .map(|parent| parent.name().to_string());
            self.0
                .lock()
                .expect("lock")
                .push((attrs.metadata().name().to_string(), parent));
        }
    }

    #[tokio::test]
    async fn tool_calls_run_inside_the_session_span() {
        use tracing_subscriber::layer::SubscriberExt;

        let parents = SpanParents::default();
        let subscriber = tracing_subscriber::registry().with(parents.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let registry = echo_registry();
        registry
            .invoke("echo", args(json!({"message": "hi"})))
            .await
            .expect("echo succeeds");

        let seen = parents.0.lock().expect("lock").clone();
        let tool_call = seen
            .iter()
            .find(|(name, _)| name == "tool_call")
            .expect("tool_call span");
        assert_eq!(tool_call.1.as_deref(), Some("meilisearch_session"));
    }
}
