use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use meilisearch_mcp_http::HttpSettings;
use meilisearch_mcp_runtime::context::{ConnectionSettings, DEFAULT_MEILI_URL, validate_url};
use thiserror::Error;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MIN_REQUEST_SIZE: u64 = 1024;
const MAX_REQUEST_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Parser)]
#[command(
    name = "meilisearch-mcp",
    version,
    about = "Meilisearch MCP server over stdio and, when a port is set, HTTP/SSE"
)]
pub struct Cli {
    /// Meilisearch base URL
    #[arg(long, env = "MEILI_HTTP_ADDR", default_value = DEFAULT_MEILI_URL)]
    pub meili_url: String,

    /// Meilisearch API key
    #[arg(long, env = "MEILI_MASTER_KEY", hide_env_values = true)]
    pub meili_api_key: Option<String>,

    /// Token required on the HTTP transport; unset disables the check
    #[arg(long, env = "MCP_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Enables the HTTP transport on this port
    #[arg(long, env = "PORT")]
    pub port: Option<u32>,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Comma-separated allowed origins, `*` for any
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Tool-call timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 300)]
    pub request_timeout: u64,

    /// Upstream request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT", default_value_t = 30)]
    pub http_timeout: u64,

    #[arg(long, env = "HEALTH_CHECK_TIMEOUT", default_value_t = 5)]
    pub health_check_timeout: u64,

    /// Request body limit in bytes
    #[arg(long, env = "MAX_REQUEST_SIZE", default_value_t = 10 * 1024 * 1024)]
    pub max_request_size: u64,

    /// Seconds of silence before an event stream gets a ping comment
    #[arg(long, env = "SSE_PING_INTERVAL", default_value_t = 30)]
    pub sse_ping_interval: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Every violation found in one pass.
#[derive(Debug, Error)]
#[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
pub struct ConfigErrors(pub Vec<String>);

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub settings: HttpSettings,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub auth_token: Option<String>,
    pub tool_timeout: Duration,
    pub log_level: String,
    /// `None` keeps the process on stdio only.
    pub http: Option<HttpConfig>,
}

fn check_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if !(min..=max).contains(&value) {
        errors.push(format!("{name} must be between {min} and {max}, got {value}"));
    }
}

impl Cli {
    pub fn into_config(self) -> Result<Config, ConfigErrors> {
        let mut errors = Vec::new();

        if let Err(err) = validate_url(self.meili_url.trim()) {
            errors.push(err.to_string());
        }
        let port = match self.port {
            None => None,
            Some(port) => match u16::try_from(port) {
                Ok(port) if port > 0 => Some(port),
                _ => {
                    errors.push(format!("PORT must be between 1 and 65535, got {port}"));
                    None
                }
            },
        };
        if self.host.trim().parse::<IpAddr>().is_err() {
            errors.push(format!("HOST must be an IP address, got '{}'", self.host));
        }
        check_range(&mut errors, "REQUEST_TIMEOUT", self.request_timeout, 1, 3600);
        check_range(&mut errors, "HTTP_TIMEOUT", self.http_timeout, 1, 300);
        check_range(&mut errors, "HEALTH_CHECK_TIMEOUT", self.health_check_timeout, 1, 60);
        check_range(
            &mut errors,
            "MAX_REQUEST_SIZE",
            self.max_request_size,
            MIN_REQUEST_SIZE,
            MAX_REQUEST_SIZE,
        );
        if self.sse_ping_interval == 0 {
            errors.push("SSE_PING_INTERVAL must be at least 1".to_string());
        }
        let log_level = self.log_level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            errors.push(format!(
                "LOG_LEVEL must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            ));
        }

        if !errors.is_empty() {
            return Err(ConfigErrors(errors));
        }

        let connection = ConnectionSettings::new(self.meili_url.trim(), self.meili_api_key.as_deref())
            .with_timeouts(
                Duration::from_secs(self.http_timeout),
                Duration::from_secs(self.health_check_timeout),
            );
        let auth_token = self
            .auth_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        let http = port.map(|port| HttpConfig {
            host: self.host.trim().to_string(),
            port,
            settings: HttpSettings {
                cors_origins: self
                    .cors_origins
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect(),
                // Bounded by MAX_REQUEST_SIZE above, so this always fits.
                max_request_size: usize::try_from(self.max_request_size).unwrap_or(usize::MAX),
                sse_ping_interval: Duration::from_secs(self.sse_ping_interval),
            },
        });

        Ok(Config {
            connection,
            auth_token,
            tool_timeout: Duration::from_secs(self.request_timeout),
            log_level,
            http,
        })
    }
}
