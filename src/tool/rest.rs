//! Declarative REST tools.
//!
//! A [`RestTool`] describes one manager endpoint: the path template, the
//! arguments it accepts and how each argument maps onto a path segment or a
//! query parameter. The input schema offered at discovery is generated from
//! the same description, so the two cannot drift apart.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value, json};

use super::{Content, ToolContext, ToolDefinition, ToolHandler, ToolMetadata};
use crate::{Error, Result};

/// JSON type of a tool argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// String
    String,
    /// Integer
    Integer,
    /// Boolean, sent upstream only when true
    Boolean,
    /// List of strings, joined with `,`
    StringList,
    /// List of integers, joined with `,`
    IntegerList,
}

impl ParamKind {
    fn schema(self) -> Map<String, Value> {
        let (ty, items) = match self {
            Self::String => ("string", None),
            Self::Integer => ("integer", None),
            Self::Boolean => ("boolean", None),
            Self::StringList => ("array", Some("string")),
            Self::IntegerList => ("array", Some("integer")),
        };
        let mut schema = Map::new();
        schema.insert("type".into(), Value::from(ty));
        if let Some(item) = items {
            schema.insert("items".into(), json!({ "type": item }));
        }
        schema
    }
}

/// Where an argument ends up in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// `{name}` in the path template
    Path,
    /// Query string
    Query,
}

/// One accepted argument
#[derive(Debug, Clone)]
pub struct Param {
    /// Argument name as seen by the model
    pub name: &'static str,
    /// Upstream query key, when it differs from `name` (e.g. `local.ip`)
    pub key: &'static str,
    /// Type
    pub kind: ParamKind,
    /// Description shown in the schema
    pub description: &'static str,
    /// Must be supplied
    pub required: bool,
    /// Sent when the caller omits the argument
    pub default: Option<Value>,
    /// Allowed values
    pub one_of: &'static [&'static str],
    /// Lower bound for integers
    pub minimum: Option<i64>,
    /// Destination
    pub location: Location,
}

impl Param {
    /// Optional query parameter sent under its own name
    #[must_use]
    pub fn query(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            key: name,
            kind,
            description,
            required: false,
            default: None,
            one_of: &[],
            minimum: None,
            location: Location::Query,
        }
    }

    /// Required path segment
    #[must_use]
    pub fn path(name: &'static str, description: &'static str) -> Self {
        Self {
            required: true,
            location: Location::Path,
            ..Self::query(name, ParamKind::String, description)
        }
    }

    /// Upstream key override
    #[must_use]
    pub fn key(mut self, key: &'static str) -> Self {
        self.key = key;
        self
    }

    /// Mark as mandatory
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Default value
    #[must_use]
    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Allowed values
    #[must_use]
    pub fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.one_of = values;
        self
    }

    /// Lower bound
    #[must_use]
    pub fn minimum(mut self, min: i64) -> Self {
        self.minimum = Some(min);
        self
    }

    fn schema(&self) -> Value {
        let mut obj = self.kind.schema();
        obj.insert("description".into(), Value::from(self.description));
        if let Some(default) = &self.default {
            obj.insert("default".into(), default.clone());
        }
        if !self.one_of.is_empty() {
            obj.insert("enum".into(), json!(self.one_of));
        }
        if let Some(min) = self.minimum {
            obj.insert("minimum".into(), json!(min));
        }
        Value::Object(obj)
    }
}

/// Post-processing applied to a parsed JSON response
pub type Shaper = fn(&Map<String, Value>, Value) -> Value;

/// A tool backed by one manager endpoint
#[derive(Clone)]
pub struct RestTool {
    /// Tool name
    pub name: &'static str,
    /// Description
    pub description: &'static str,
    /// Category for filtering
    pub category: &'static str,
    /// HTTP method
    pub method: Method,
    /// Path template with `{param}` placeholders
    pub path: &'static str,
    /// Accepted arguments, `cluster` excluded
    pub params: Vec<Param>,
    /// Boolean argument that switches the response to plain text
    pub raw_flag: Option<&'static str>,
    /// Optional response post-processing
    pub shaper: Option<Shaper>,
}

impl RestTool {
    /// Tool with no arguments besides `cluster`
    #[must_use]
    pub fn new(
        name: &'static str,
        description: &'static str,
        category: &'static str,
        method: Method,
        path: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            category,
            method,
            path,
            params: Vec::new(),
            raw_flag: None,
            shaper: None,
        }
    }

    /// Append arguments
    #[must_use]
    pub fn params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params.extend(params);
        self
    }

    /// Plain-text response when `flag` is true
    #[must_use]
    pub fn raw_flag(mut self, flag: &'static str) -> Self {
        self.raw_flag = Some(flag);
        self
    }

    /// Response post-processing
    #[must_use]
    pub fn shaper(mut self, shaper: Shaper) -> Self {
        self.shaper = Some(shaper);
        self
    }

    /// JSON Schema for the arguments, `cluster` included
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert("cluster".into(), cluster_schema());

        let mut required = vec![Value::from("cluster")];
        for param in &self.params {
            properties.insert(param.name.into(), param.schema());
            if param.required {
                required.push(Value::from(param.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Register-ready definition
    #[must_use]
    pub fn into_definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema: self.input_schema(),
            metadata: ToolMetadata {
                category: self.category.to_string(),
                http_method: Some(self.method.clone()),
            },
            handler: Arc::new(self),
        }
    }

    /// Path with placeholders replaced by percent-encoded arguments
    pub fn render_path(&self, args: &Map<String, Value>) -> Result<String> {
        let mut path = self.path.to_string();
        for param in self.params.iter().filter(|p| p.location == Location::Path) {
            let value = args
                .get(param.name)
                .and_then(scalar_to_string)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Validation(format!("'{}' is required", param.name)))?;
            path = path.replace(&format!("{{{}}}", param.name), &encode_segment(&value));
        }
        Ok(path)
    }

    /// Query pairs in declaration order, defaults applied
    #[must_use]
    pub fn query_pairs(&self, args: &Map<String, Value>) -> Vec<(String, String)> {
        self.params
            .iter()
            .filter(|p| p.location == Location::Query)
            .filter_map(|p| {
                let value = args.get(p.name).or(p.default.as_ref())?;
                let rendered = match (p.kind, value) {
                    (ParamKind::Boolean, Value::Bool(true)) => "true".to_string(),
                    (ParamKind::Boolean, _) => return None,
                    (_, Value::Array(items)) => {
                        let joined: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
                        if joined.is_empty() {
                            return None;
                        }
                        joined.join(",")
                    }
                    (_, v) => scalar_to_string(v)?,
                };
                Some((p.key.to_string(), rendered))
            })
            .collect()
    }
}

#[async_trait]
impl ToolHandler for RestTool {
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Vec<Content>> {
        let Value::Object(args) = args else {
            return Err(Error::Validation("arguments must be an object".into()));
        };
        let cluster = args
            .get("cluster")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("'cluster' is required".into()))?;

        let path = self.render_path(&args)?;
        let query = self.query_pairs(&args);
        let raw = self
            .raw_flag
            .is_some_and(|flag| args.get(flag).and_then(Value::as_bool) == Some(true));

        let response = ctx
            .upstream
            .request(cluster, self.method.clone(), &path, &query)
            .await?;

        let body = if raw {
            let mut wrapped = Map::new();
            wrapped.insert("content".into(), Value::String(response.body));
            wrapped.insert("raw".into(), Value::Bool(true));
            for param in self.params.iter().filter(|p| p.location == Location::Path) {
                if let Some(value) = args.get(param.name) {
                    wrapped.insert(param.name.into(), value.clone());
                }
            }
            Value::Object(wrapped)
        } else {
            let parsed = response.json()?;
            match self.shaper {
                Some(shape) => shape(&args, parsed),
                None => parsed,
            }
        };

        Ok(vec![Content::text(render_json(&body, ctx.output.max_chars))])
    }
}

fn cluster_schema() -> Value {
    json!({
        "type": "string",
        "description": "Name of the configured Wazuh cluster to query",
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Percent-encode one path segment so arguments cannot add segments
#[must_use]
pub fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Pretty-print JSON and cut it to `max_chars` characters
#[must_use]
pub fn render_json(value: &Value, max_chars: usize) -> String {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    truncate(&text, max_chars)
}

/// Cut text to `max_chars` characters, noting how much was dropped
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}\n\n[... truncated {} characters ...]", total - max_chars)
}
