//! Upstream connection identity shared by every tool call.
//!
//! A [`ContextHandle`] owns at most one published [`SessionContext`]. The
//! context itself is immutable: reconfiguration builds a complete
//! replacement and swaps the `Arc`, so a reader holds either the old or the
//! new context, never a mix of both.

use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::chat::ChatClient;
use crate::upstream::MeilisearchClient;

pub const DEFAULT_MEILI_URL: &str = "http://localhost:7700";
pub const MEILI_URL_ENV: &str = "MEILI_HTTP_ADDR";
pub const MEILI_API_KEY_ENV: &str = "MEILI_MASTER_KEY";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid Meilisearch URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Where the upstream lives and how to talk to it.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub http_timeout: Duration,
    pub health_check_timeout: Duration,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("url", &self.url)
            .field("has_api_key", &self.api_key.is_some())
            .field("http_timeout", &self.http_timeout)
            .field("health_check_timeout", &self.health_check_timeout)
            .finish()
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_MEILI_URL.to_string(),
            api_key: None,
            http_timeout: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionSettings {
    pub fn new(url: impl Into<String>, api_key: Option<&str>) -> Self {
        Self {
            url: url.into(),
            api_key: normalize_api_key(api_key),
            ..Self::default()
        }
    }

    /// Reads `MEILI_HTTP_ADDR` and `MEILI_MASTER_KEY`.
    pub fn from_env() -> Self {
        let url = std::env::var(MEILI_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MEILI_URL.to_string());
        let api_key = std::env::var(MEILI_API_KEY_ENV).ok();
        Self::new(url, api_key.as_deref())
    }

    pub fn with_timeouts(mut self, http: Duration, health_check: Duration) -> Self {
        self.http_timeout = http;
        self.health_check_timeout = health_check;
        self
    }

    /// Applies a partial update. An omitted or empty url keeps the current
    /// one; an omitted key keeps the current key and an empty key clears it.
    pub fn merged(&self, url: Option<&str>, api_key: Option<&str>) -> Self {
        let mut next = self.clone();
        if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
            next.url = url.to_string();
        }
        if let Some(key) = api_key {
            next.api_key = normalize_api_key(Some(key));
        }
        next
    }
}

fn normalize_api_key(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

/// Parses and checks an upstream base URL: http or https, with a host.
pub fn validate_url(raw: &str) -> Result<Url, ContextError> {
    let invalid = |reason: String| ContextError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// One immutable upstream identity plus the clients derived from it.
pub struct SessionContext {
    settings: ConnectionSettings,
    base_url: Url,
    http: reqwest::Client,
    meilisearch: OnceLock<MeilisearchClient>,
    chat: OnceLock<ChatClient>,
    span: tracing::Span,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    pub fn connect(settings: ConnectionSettings) -> Result<Self, ContextError> {
        let base_url = validate_url(&settings.url)?;
        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(settings.http_timeout))
            .build()?;
        let span = tracing::info_span!(
            "meilisearch_session",
            url = %settings.url,
            has_api_key = settings.api_key.is_some()
        );
        Ok(Self {
            settings,
            base_url,
            http,
            meilisearch: OnceLock::new(),
            chat: OnceLock::new(),
            span,
        })
    }

    pub fn url(&self) -> &str {
        &self.settings.url
    }

    pub fn api_key(&self) -> Option<&str> {
        self.settings.api_key.as_deref()
    }

    pub fn has_api_key(&self) -> bool {
        self.settings.api_key.is_some()
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Logging scope for work done on behalf of this context.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn meilisearch(&self) -> &MeilisearchClient {
        self.meilisearch.get_or_init(|| {
            MeilisearchClient::new(
                self.http.clone(),
                self.base_url.clone(),
                self.settings.api_key.clone(),
                self.settings.health_check_timeout,
            )
        })
    }

    pub fn chat(&self) -> &ChatClient {
        self.chat.get_or_init(|| {
            ChatClient::new(
                self.http.clone(),
                self.base_url.clone(),
                self.settings.api_key.clone(),
            )
        })
    }

    fn warm(&self) {
        self.meilisearch();
        self.chat();
    }
}

/// Owner of the published [`SessionContext`].
///
/// Passed explicitly to every component that needs the upstream; there is
/// no ambient global.
#[derive(Debug)]
pub struct ContextHandle {
    defaults: ConnectionSettings,
    current: RwLock<Option<Arc<SessionContext>>>,
    // Serializes construction so concurrent first access builds once and
    // reconfigurations apply in order.
    build: Mutex<()>,
}

impl ContextHandle {
    pub fn new(defaults: ConnectionSettings) -> Self {
        Self {
            defaults,
            current: RwLock::new(None),
            build: Mutex::new(()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ConnectionSettings::from_env())
    }

    /// A handle that starts with `context` already published.
    pub fn with_context(context: SessionContext) -> Self {
        let handle = Self::new(context.settings.clone());
        *handle.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(context));
        handle
    }

    pub fn defaults(&self) -> &ConnectionSettings {
        &self.defaults
    }

    pub fn get(&self) -> Result<Arc<SessionContext>, ContextError> {
        if let Some(context) = self.published() {
            return Ok(context);
        }

        let _build = self.build.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(context) = self.published() {
            return Ok(context);
        }

        let context = Arc::new(SessionContext::connect(self.defaults.clone())?);
        self.publish(Arc::clone(&context));
        tracing::info!(
            event = "session_context_created",
            url = %context.url(),
            has_api_key = context.has_api_key(),
            "Meilisearch session context initialized"
        );
        Ok(context)
    }

    /// Replaces the published context. The replacement, including its
    /// derived clients, is fully built before it becomes visible.
    pub fn reconfigure(
        &self,
        url: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Arc<SessionContext>, ContextError> {
        let _build = self.build.lock().unwrap_or_else(PoisonError::into_inner);
        let base = self
            .published()
            .map(|context| context.settings.clone())
            .unwrap_or_else(|| self.defaults.clone());

        let context = SessionContext::connect(base.merged(url, api_key))?;
        context.warm();
        let context = Arc::new(context);
        self.publish(Arc::clone(&context));

        tracing::info!(
            event = "connection_settings_updated",
            url = %context.url(),
            has_api_key = context.has_api_key(),
            "Updated Meilisearch connection settings"
        );
        Ok(context)
    }

    /// Drops the published context; the next [`get`](Self::get) rebuilds it
    /// from the defaults. Contexts still held by in-flight calls stay valid
    /// until those calls finish.
    pub fn reset(&self) {
        let _build = self.build.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(context) = previous {
            context.span.in_scope(|| {
                tracing::info!(event = "session_context_reset", "Closing Meilisearch session context");
            });
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.published().is_some()
    }

    fn published(&self) -> Option<Arc<SessionContext>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, context: Arc<SessionContext>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> ContextHandle {
        ContextHandle::new(ConnectionSettings::new("http://localhost:7700", None))
    }

    #[test]
    fn get_builds_once_and_reuses() {
        let handle = handle();
        assert!(!handle.is_initialized());

        let first = handle.get().expect("default url is valid");
        let second = handle.get().expect("context is cached");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.url(), "http://localhost:7700");
        assert_eq!(first.api_key(), None);
    }

    #[test]
    fn reconfigure_publishes_new_url_and_key() {
        let handle = handle();
        let before = handle.get().expect("context");

        handle
            .reconfigure(Some("http://newhost:7700"), Some("new_api_key"))
            .expect("valid settings");

        let after = handle.get().expect("context");
        assert_eq!(after.url(), "http://newhost:7700");
        assert_eq!(after.api_key(), Some("new_api_key"));
        assert_eq!(after.meilisearch().base_url().as_str(), "http://newhost:7700/");

        // Readers holding the old context keep a consistent view.
        assert_eq!(before.url(), "http://localhost:7700");
        assert_eq!(before.api_key(), None);
    }

    #[test]
    fn reconfigure_keeps_omitted_fields_and_clears_empty_key() {
        let handle = ContextHandle::new(ConnectionSettings::new(
            "http://localhost:7700",
            Some("master"),
        ));

        let ctx = handle
            .reconfigure(Some("http://other:7700"), None)
            .expect("valid");
        assert_eq!(ctx.api_key(), Some("master"));

        let ctx = handle.reconfigure(None, Some("  ")).expect("valid");
        assert_eq!(ctx.url(), "http://other:7700");
        assert_eq!(ctx.api_key(), None);

        let ctx = handle.reconfigure(Some(""), Some(" rotated ")).expect("valid");
        assert_eq!(ctx.url(), "http://other:7700");
        assert_eq!(ctx.api_key(), Some("rotated"));
    }

    #[test]
    fn malformed_url_propagates_and_keeps_previous_context() {
        let handle = handle();
        handle.get().expect("context");

        let err = handle
            .reconfigure(Some("not a url"), None)
            .expect_err("malformed url must fail");
        assert!(matches!(err, ContextError::InvalidUrl { .. }));

        let err = handle
            .reconfigure(Some("ftp://files.example.com"), None)
            .expect_err("ftp is not supported");
        assert!(err.to_string().contains("unsupported scheme"));

        assert_eq!(handle.get().expect("context").url(), "http://localhost:7700");
    }

    #[test]
    fn get_surfaces_invalid_defaults() {
        let handle = ContextHandle::new(ConnectionSettings::new("localhost:7700", None));
        assert!(handle.get().is_err());
        assert!(!handle.is_initialized());
    }

    #[test]
    fn reset_rebuilds_from_defaults() {
        let handle = handle();
        handle
            .reconfigure(Some("http://newhost:7700"), Some("k"))
            .expect("valid");

        handle.reset();
        assert!(!handle.is_initialized());

        let ctx = handle.get().expect("rebuilt");
        assert_eq!(ctx.url(), "http://localhost:7700");
        assert_eq!(ctx.api_key(), None);
    }

    #[test]
    fn concurrent_first_access_builds_a_single_context() {
        let handle = Arc::new(handle());
        let contexts: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || handle.get().expect("context"))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| t.join().expect("thread"))
            .collect();

        for ctx in &contexts[1..] {
            assert!(Arc::ptr_eq(&contexts[0], ctx));
        }
    }

    #[test]
    fn debug_output_never_contains_the_key() {
        let settings = ConnectionSettings::new("http://localhost:7700", Some("super-secret"));
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("has_api_key: true"));
    }
}
