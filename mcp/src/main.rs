use std::sync::Arc;

use clap::Parser;
use meilisearch_mcp_core::AuthGate;
use meilisearch_mcp_http::{AppState, ServeError};
use meilisearch_mcp_runtime::McpServer;
use meilisearch_mcp_runtime::context::ContextHandle;
use meilisearch_mcp_runtime::registry::RegistryError;
use meilisearch_mcp_runtime::stdio::serve_stdio;
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::{Cli, Config};

const DEFAULT_LOG_FILTER: &str = "meilisearch_mcp=info,tower_http=info";

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to build tool catalogue: {0}")]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Serve(#[from] ServeError),
    #[error("HTTP transport task failed: {0}")]
    Join(#[from] JoinError),
}

enum Stop {
    Signal,
    InputClosed(Result<std::io::Result<()>, JoinError>),
    HttpStopped(Result<Result<(), ServeError>, JoinError>),
}

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(errors) => {
            eprintln!("{errors}");
            std::process::exit(2);
        }
    };

    init_tracing(&config.log_level);

    // Exiting directly keeps a blocked stdin reader from holding the runtime open.
    let code = match run(config).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(event = "startup_failed", error = %err, "Server stopped with an error");
            1
        }
    };
    std::process::exit(code);
}

/// JSON logs on stderr. `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if log_level == "info" {
            DEFAULT_LOG_FILTER.into()
        } else {
            format!("meilisearch_mcp={log_level},tower_http={log_level}").into()
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn run(config: Config) -> Result<(), StartupError> {
    let session = Arc::new(ContextHandle::new(config.connection.clone()));
    let server = Arc::new(
        McpServer::meilisearch(Arc::clone(&session))?.with_tool_timeout(config.tool_timeout),
    );
    let shutdown = CancellationToken::new();

    tracing::info!(
        event = "server_starting",
        url = %config.connection.url,
        has_api_key = config.connection.api_key.is_some(),
        http = config.http.is_some(),
        auth = config.auth_token.is_some(),
        tools = server.registry().len(),
        "Starting Meilisearch MCP server"
    );

    let mut http = match config.http {
        Some(http) => {
            let listener = meilisearch_mcp_http::bind(&http.host, http.port).await?;
            let state = AppState::new(
                Arc::clone(&server),
                AuthGate::new(config.auth_token.as_deref()),
                http.settings,
                shutdown.clone(),
            );
            Some(tokio::spawn(meilisearch_mcp_http::serve(listener, state)))
        }
        None => None,
    };
    let serving_http = http.is_some();

    let mut stdio = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { serve_stdio(&server).await })
    };

    // End of stdin only stops the process when stdio is the sole transport.
    let stop = tokio::select! {
        () = shutdown_signal() => Stop::Signal,
        result = &mut stdio, if !serving_http => Stop::InputClosed(result),
        result = async {
            match http.as_mut() {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        } => Stop::HttpStopped(result),
    };

    let mut outcome = Ok(());
    match stop {
        Stop::Signal => tracing::info!(event = "shutdown_signal", "Shutdown signal received"),
        Stop::InputClosed(Ok(Ok(()))) => {
            tracing::info!(event = "stdin_closed", "Input closed, shutting down");
        }
        Stop::InputClosed(Ok(Err(err))) => {
            tracing::warn!(event = "stdio_failed", error = %err, "stdio transport failed");
        }
        Stop::InputClosed(Err(err)) => {
            tracing::error!(event = "stdio_task_failed", error = %err, "stdio task failed");
        }
        Stop::HttpStopped(result) => {
            http = None;
            outcome = match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err.into()),
                Err(err) => Err(err.into()),
            };
        }
    }

    shutdown.cancel();
    if let Some(handle) = http {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(event = "http_shutdown_failed", error = %err, "HTTP transport failed during shutdown");
            }
            Err(err) => {
                tracing::error!(event = "http_task_failed", error = %err, "HTTP task failed");
            }
        }
    }
    stdio.abort();
    session.reset();
    tracing::info!(event = "server_stopped", "Meilisearch MCP server stopped");
    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(event = "signal_handler_failed", error = %err, "Could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(event = "signal_handler_failed", error = %err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}
