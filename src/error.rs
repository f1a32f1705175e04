//! Error types for the Wazuh gateway

use std::io;

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
///
/// `Validation`, `FilterDenied`, `ToolNotFound`, `Upstream` and `Auth` form the
/// invocation taxonomy and are folded into a failed `ToolResult`. Everything
/// else is an infrastructure failure.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cluster name not present in the registry
    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    /// Credential exchange with a cluster failed
    #[error("Authentication failed for cluster '{cluster}': {message}")]
    Auth {
        /// Cluster name
        cluster: String,
        /// HTTP status returned by the manager, if any
        status: Option<u16>,
        /// Failure description
        message: String,
    },

    /// Tool is not registered
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool name registered twice
    #[error("Duplicate tool registration: {0}")]
    DuplicateTool(String),

    /// Tool exists but the active filter policy rejects it
    #[error("Tool '{tool}' is disabled: {reason}")]
    FilterDenied {
        /// Tool name
        tool: String,
        /// Which rule matched
        reason: String,
    },

    /// Tool arguments did not satisfy the input schema
    #[error("{0}")]
    Validation(String),

    /// Upstream manager returned an error or could not be reached
    #[error("Upstream error{}: {body}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Upstream {
        /// HTTP status, `None` for transport failures
        status: Option<u16>,
        /// Response body or transport error text
        body: String,
    },

    /// Malformed inbound request
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an upstream error from a status and body
    pub fn upstream(status: Option<u16>, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// Build an authentication error
    pub fn auth(cluster: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Auth {
            cluster: cluster.into(),
            status,
            message: message.into(),
        }
    }

    /// HTTP status used when the error reaches the transport
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Protocol(_) | Self::Json(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ToolNotFound(_) | Self::ClusterNotFound(_) => StatusCode::NOT_FOUND,
            Self::FilterDenied { .. } => StatusCode::FORBIDDEN,
            Self::Auth { .. } | Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
