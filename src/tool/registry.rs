//! Tool registry

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::result::{ToolError, ToolErrorKind, ToolResult};
use super::schema;
use super::{ToolContext, ToolDefinition};
use crate::{Error, Result};

/// Catalogue of invocable tools, in registration order.
///
/// Populated once at startup and shared read-only afterwards.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names must be unique.
    pub fn register(&mut self, tool: ToolDefinition) -> Result<()> {
        if self.index.contains_key(&tool.name) {
            return Err(Error::DuplicateTool(tool.name));
        }
        debug!(tool = %tool.name, category = %tool.metadata.category, "Registered tool");
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Every tool, in registration order
    pub fn list(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter()
    }

    /// Look up a tool by exact name
    pub fn get(&self, name: &str) -> Result<&ToolDefinition> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))
    }

    /// Number of tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate arguments and run the tool.
    ///
    /// Failures in the invocation taxonomy come back as `Ok` with
    /// `success: false`. Only unexpected errors are returned as `Err`.
    pub async fn invoke(&self, name: &str, raw_args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let Ok(tool) = self.get(name) else {
            return Ok(ToolResult::failure(ToolError::new(
                ToolErrorKind::ToolNotFound,
                format!("Tool not found: {name}"),
            )));
        };

        let args = match schema::validate(&raw_args, &tool.input_schema) {
            Ok(args) => args,
            Err(violations) => {
                debug!(tool = %name, violations = violations.0.len(), "Arguments rejected");
                return Ok(ToolResult::failure(ToolError::validation(
                    violations.render(name, &tool.input_schema),
                )));
            }
        };

        if let Some(cluster) = args.get("cluster").and_then(Value::as_str) {
            if !ctx.clusters.contains(cluster) {
                let known: Vec<&str> = ctx.clusters.names().collect();
                return Ok(ToolResult::failure(ToolError::validation(format!(
                    "Unknown cluster '{cluster}'. Configured clusters: {}",
                    if known.is_empty() { "(none)".to_string() } else { known.join(", ") }
                ))));
            }
        }

        match tool.handler.call(ctx, Value::Object(args)).await {
            Ok(content) => {
                info!(tool = %name, "Tool call succeeded");
                Ok(ToolResult::success(content))
            }
            Err(e) => match ToolResult::from_error(&e) {
                Some(result) => {
                    warn!(tool = %name, error = %e, "Tool call failed");
                    Ok(result)
                }
                None => {
                    error!(tool = %name, error = %e, "Unexpected tool failure");
                    Err(e)
                }
            },
        }
    }
}
