//! Tool discovery and invocation payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::ToolDefinition;

/// Tool as advertised at discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// Input JSON Schema
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    /// Category
    pub category: String,
    /// Upstream HTTP method, absent for tools without one
    #[serde(rename = "httpMethod", skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
}

impl From<&ToolDefinition> for ToolDescriptor {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            input_schema: def.input_schema.clone(),
            category: def.metadata.category.clone(),
            http_method: def.metadata.http_method.as_ref().map(ToString::to_string),
        }
    }
}

/// `GET /tools` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// Visible tools, in registration order
    pub tools: Vec<ToolDescriptor>,
}

/// `POST /tools/call` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool name
    pub name: String,
    /// Arguments object
    #[serde(default)]
    pub arguments: Value,
}

/// Health probe response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests
    pub status: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::testing::definition;
    use pretty_assertions::assert_eq;
    use reqwest::Method;
    use serde_json::json;

    #[test]
    fn descriptor_uses_camel_case_keys() {
        let desc = ToolDescriptor::from(&definition("GetAgentsTool", "agents", Some(Method::GET)));
        let value = serde_json::to_value(&desc).unwrap();
        assert_eq!(value["httpMethod"], json!("GET"));
        assert_eq!(value["category"], json!("agents"));
        assert!(value.get("inputSchema").is_some());
    }

    #[test]
    fn descriptor_omits_missing_method() {
        let desc = ToolDescriptor::from(&definition("AuthenticateTool", "security", None));
        let value = serde_json::to_value(&desc).unwrap();
        assert!(value.get("httpMethod").is_none());
    }

    #[test]
    fn call_params_default_arguments() {
        let params: CallToolParams = serde_json::from_value(json!({"name": "X"})).unwrap();
        assert_eq!(params.arguments, Value::Null);
    }
}
