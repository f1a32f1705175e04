//! Wazuh MCP Gateway Library
//!
//! Exposes the Wazuh Manager REST API as a catalogue of tools callable by
//! language-model agents.
//!
//! # Components
//!
//! - **Clusters**: immutable per-cluster connection settings
//! - **Auth**: one access token per cluster, refreshed ahead of expiry with
//!   single-flight exchange
//! - **Upstream**: pooled, authenticated manager calls with one retry on 401
//! - **Tools**: registry, schema validation and admission filtering
//! - **Gateway**: discovery, invocation, chat completions and SSE over HTTP

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod tool;
pub mod upstream;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer().with_target(false)).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("tracing already initialised: {e}")))
}
