//! MCP dispatcher for the Meilisearch tool catalogue.
//!
//! [`McpServer`] turns one JSON-RPC message into at most one response. It
//! is transport-agnostic: the line channel in [`stdio`] and the HTTP
//! transport both drive it.

use std::sync::Arc;
use std::time::Duration;

use meilisearch_mcp_core::{JsonRpcRequest, JsonRpcResponse, ProtocolError};
use serde_json::{Map, Value, json};

pub mod chat;
pub mod context;
pub mod registry;
pub mod schema;
pub mod stdio;
pub mod tools;
pub mod upstream;
mod util;

use context::ContextHandle;
use registry::{RegistryError, ToolCallResult, ToolRegistry};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "meilisearch";
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// The methods this server knows. Anything else is `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpMethod {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
    PromptsList,
    ResourcesList,
    Initialized,
    Cancelled,
    Unknown(String),
}

impl McpMethod {
    pub fn parse(method: &str) -> Self {
        match method {
            "initialize" => Self::Initialize,
            "ping" => Self::Ping,
            "tools/list" => Self::ToolsList,
            "tools/call" => Self::ToolsCall,
            "prompts/list" => Self::PromptsList,
            "resources/list" => Self::ResourcesList,
            "notifications/initialized" => Self::Initialized,
            "notifications/cancelled" => Self::Cancelled,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::PromptsList => "prompts/list",
            Self::ResourcesList => "resources/list",
            Self::Initialized => "notifications/initialized",
            Self::Cancelled => "notifications/cancelled",
            Self::Unknown(method) => method,
        }
    }

    /// Whether an HTTP caller always gets the response in the POST body,
    /// even while stream subscribers are connected.
    pub fn replies_inline(&self) -> bool {
        matches!(
            self,
            Self::Initialize
                | Self::ToolsList
                | Self::ToolsCall
                | Self::PromptsList
                | Self::ResourcesList
        )
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

pub struct McpServer {
    registry: Arc<ToolRegistry>,
    tool_timeout: Duration,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("tools", &self.registry.len())
            .field("tool_timeout", &self.tool_timeout)
            .finish()
    }
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// A server exposing the full Meilisearch catalogue.
    pub fn meilisearch(session: Arc<ContextHandle>) -> Result<Self, RegistryError> {
        Ok(Self::new(tools::build_registry(session)?))
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn session(&self) -> &Arc<ContextHandle> {
        self.registry.session()
    }

    /// Handles one decoded message. Batches are refused; known notifications
    /// yield `None`.
    pub async fn handle_value(&self, incoming: Value) -> Option<JsonRpcResponse> {
        if incoming.is_array() {
            return Some(JsonRpcResponse::failure(
                Value::Null,
                &ProtocolError::invalid_request("batch requests are not supported"),
            ));
        }
        match JsonRpcRequest::from_value(incoming) {
            Ok(request) => self.handle_request(&request).await,
            Err(rejected) => {
                tracing::debug!(
                    event = "mcp_request_rejected",
                    error = %rejected.error,
                    "Rejected JSON-RPC envelope"
                );
                Some(rejected.into_response())
            }
        }
    }

    pub async fn handle_request(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        let method = McpMethod::parse(&request.method);
        if request.is_notification() {
            if let McpMethod::Unknown(name) = &method {
                tracing::debug!(event = "mcp_unknown_notification", method = %name, "Unknown method without id");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    &ProtocolError::MethodNotFound(name.clone()),
                ));
            }
            tracing::debug!(event = "mcp_notification", method = %method.as_str(), "Notification received");
            return None;
        }

        tracing::debug!(event = "mcp_request", method = %method.as_str(), "Request received");
        let result = self.route(&method, request).await;
        Some(JsonRpcResponse::from_result(request.response_id(), result))
    }

    async fn route(
        &self,
        method: &McpMethod,
        request: &JsonRpcRequest,
    ) -> Result<Value, ProtocolError> {
        match method {
            McpMethod::Initialize => Ok(self.initialize_payload()),
            McpMethod::Ping | McpMethod::Initialized | McpMethod::Cancelled => Ok(json!({})),
            McpMethod::ToolsList => Ok(self.tools_list_payload()),
            McpMethod::ToolsCall => self.handle_tools_call(request).await,
            McpMethod::PromptsList => Ok(json!({ "prompts": [] })),
            McpMethod::ResourcesList => Ok(json!({ "resources": [] })),
            McpMethod::Unknown(name) => Err(ProtocolError::MethodNotFound(name.clone())),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "logging": {},
                "prompts": {},
                "resources": {}
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = self
            .registry
            .list()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, request: &JsonRpcRequest) -> Result<Value, ProtocolError> {
        let params = request.params_object()?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ProtocolError::invalid_params("tools/call requires string field 'name'"))?
            .to_string();
        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(ProtocolError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let result = self.call_tool(name, args).await;
        serde_json::to_value(result).map_err(|err| ProtocolError::internal(err.to_string()))
    }

    /// Runs a tool under the configured timeout. The tool runs on its own
    /// task, so a timed-out call keeps going in the background.
    pub async fn call_tool(&self, name: String, args: Map<String, Value>) -> ToolCallResult {
        let registry = Arc::clone(&self.registry);
        let tool = name.clone();
        let task = tokio::spawn(async move { registry.call(&tool, args).await });

        match tokio::time::timeout(self.tool_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                tracing::error!(
                    event = "tool_call_aborted",
                    tool = %name,
                    error = %join_error,
                    "Tool task did not complete"
                );
                ToolCallResult::error(format!("Tool execution failed: {join_error}"))
            }
            Err(_) => {
                tracing::warn!(
                    event = "tool_call_timed_out",
                    tool = %name,
                    timeout_secs = self.tool_timeout.as_secs(),
                    "Tool call timed out"
                );
                ToolCallResult::error(format!(
                    "Tool execution timed out after {}. The operation may still be processing.",
                    describe_duration(self.tool_timeout)
                ))
            }
        }
    }
}

fn describe_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    if secs == 0 {
        plural(duration.as_millis() as u64, "millisecond")
    } else if secs % 60 == 0 {
        plural(secs / 60, "minute")
    } else {
        plural(secs, "second")
    }
}
