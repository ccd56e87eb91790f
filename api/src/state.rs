use std::sync::Arc;
use std::time::Duration;

use meilisearch_mcp_core::AuthGate;
use meilisearch_mcp_runtime::McpServer;
use tokio_util::sync::CancellationToken;

use crate::subscribers::SubscriberSet;

pub const DEFAULT_MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_SSE_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Transport knobs that do not concern the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// `*` allows any origin.
    pub cors_origins: Vec<String>,
    pub max_request_size: usize,
    pub sse_ping_interval: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            cors_origins: vec!["*".to_string()],
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            sse_ping_interval: DEFAULT_SSE_PING_INTERVAL,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<McpServer>,
    pub subscribers: SubscriberSet,
    pub auth: Arc<AuthGate>,
    pub settings: Arc<HttpSettings>,
    /// Cancelled once on process shutdown; every event stream watches it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        server: Arc<McpServer>,
        auth: AuthGate,
        settings: HttpSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            server,
            subscribers: SubscriberSet::default(),
            auth: Arc::new(auth),
            settings: Arc::new(settings),
            shutdown,
        }
    }
}
