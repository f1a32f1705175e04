//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::tool::ToolDefinition;
use crate::{Error, Result};

/// Wazuh MCP gateway server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Shared state
    state: Arc<AppState>,
}

impl Gateway {
    /// Create a gateway exposing the built-in tools
    pub fn new(config: Config) -> Result<Self> {
        Self::with_tools(config, Vec::new())
    }

    /// Create a gateway with additional tools.
    ///
    /// Fails when a cluster name, filter pattern or tool name is invalid or
    /// duplicated.
    pub fn with_tools(config: Config, extra_tools: Vec<ToolDefinition>) -> Result<Self> {
        let state = Arc::new(AppState::from_config(&config, extra_tools)?);

        for cluster in state.ctx.clusters.iter() {
            info!(
                cluster = %cluster.name,
                url = %cluster.base_url,
                tls_verify = cluster.tls_verify,
                "Registered cluster"
            );
        }

        Ok(Self { config, state })
    }

    /// Shared application state
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Run the gateway until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let app = create_router(Arc::clone(&self.state));
        let listener = TcpListener::bind(addr).await?;

        let visible = self.state.visible_tools().len();
        let base = format!("http://{}:{}", self.config.server.host, self.config.server.port);

        info!("============================================================");
        info!("WAZUH MCP GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(clusters = self.state.ctx.clusters.len(), "Clusters configured");
        info!(
            visible,
            total = self.state.registry.len(),
            read_only = self.config.filter.read_only,
            "Tools enabled"
        );
        info!("  GET  {base}/tools     (discovery)");
        info!("  POST {base}/tools/call");
        info!("  POST {base}/messages  (chat completions)");
        info!("  GET  {base}/sse       (streaming)");
        info!("============================================================");

        if self.state.filter.is_permissive() {
            info!("No tool filter active");
        }
        if self.state.ctx.clusters.is_empty() {
            warn!("No clusters configured - every tool call will fail validation");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
