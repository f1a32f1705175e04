//! Tool catalogue: definitions, admission filtering and invocation

pub mod builtin;
pub mod filter;
pub mod registry;
pub mod rest;
pub mod result;
pub mod schema;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

pub use filter::{FilterConfig, FilterPolicy};
pub use registry::ToolRegistry;
pub use result::{Content, ToolError, ToolErrorKind, ToolResult};

use crate::Result;
use crate::auth::AuthManager;
use crate::cluster::ClusterRegistry;
use crate::config::OutputConfig;
use crate::upstream::UpstreamClient;

/// Shared dependencies handed to every handler
#[derive(Clone)]
pub struct ToolContext {
    /// Configured clusters
    pub clusters: Arc<ClusterRegistry>,
    /// Token manager
    pub auth: Arc<AuthManager>,
    /// Authenticated manager client
    pub upstream: Arc<UpstreamClient>,
    /// Output shaping
    pub output: OutputConfig,
}

/// Executes one tool with already-validated arguments
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Vec<Content>>;
}

/// Filter-relevant facts about a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolMetadata {
    /// Category used by category deny lists
    pub category: String,
    /// Upstream HTTP method, `None` for tools that make no REST call of their own
    pub http_method: Option<Method>,
}

/// A registered tool
#[derive(Clone)]
pub struct ToolDefinition {
    /// Unique name
    pub name: String,
    /// Description shown at discovery
    pub description: String,
    /// JSON Schema for the arguments object
    pub input_schema: Value,
    /// Category and method
    pub metadata: ToolMetadata,
    /// Implementation
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("category", &self.metadata.category)
            .field("http_method", &self.metadata.http_method)
            .finish_non_exhaustive()
    }
}
