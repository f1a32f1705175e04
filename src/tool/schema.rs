//! Argument validation against a tool's JSON input schema.
//!
//! Arguments arrive from a language model, so the checks are strict about
//! structure but forgiving about representation: `"10"` is accepted for an
//! integer, `"true"` for a boolean and `"active,pending"` for a string array.
//!
//! Checks run in this order and stop after the first stage that fails:
//!
//! 1. the arguments are an object (null counts as empty);
//! 2. every `required` parameter is present and non-null;
//! 3. no parameter outside `properties` is supplied;
//! 4. per parameter: type with coercion, array item types, `enum`,
//!    `minimum`/`maximum`, `minLength`/`maxLength`.

use std::collections::HashSet;
use std::fmt::Write as _;

use serde_json::{Map, Value};

/// One problem with the supplied arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Offending parameter, empty for problems with the whole object.
    pub param: String,
    /// What is wrong.
    pub message: String,
}

impl Violation {
    fn new(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            message: message.into(),
        }
    }
}

/// Non-empty list of violations found in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violations(pub Vec<Violation>);

impl Violations {
    /// Render the violations plus a parameter cheat sheet for the model.
    #[must_use]
    pub fn render(&self, tool: &str, schema: &Value) -> String {
        let mut out = format!("Invalid arguments for {tool}:\n");

        for v in &self.0 {
            if v.param.is_empty() {
                let _ = writeln!(out, "- {}", v.message);
            } else {
                let _ = writeln!(out, "- '{}': {}", v.param, v.message);
            }
        }

        let params = describe_params(schema);
        if !params.is_empty() {
            out.push_str("\nAccepted parameters:\n");
            for line in params {
                let _ = writeln!(out, "  {line}");
            }
        }

        out
    }
}

/// Validate `arguments` and return them with coercions applied.
///
/// Optional parameters that were omitted or passed as `null` are dropped from
/// the returned object. A schema without `properties` accepts any object.
pub fn validate(arguments: &Value, schema: &Value) -> Result<Map<String, Value>, Violations> {
    let args = match arguments {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(Violations(vec![Violation::new(
                "",
                format!("arguments must be a JSON object, got {}", type_name(other)),
            )]));
        }
    };

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(args);
    };

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut violations: Vec<Violation> = required
        .iter()
        .filter_map(|name| match args.get(*name) {
            None => Some(Violation::new(*name, "required parameter is missing")),
            Some(Value::Null) => Some(Violation::new(*name, "required parameter must not be null")),
            Some(_) => None,
        })
        .collect();

    let mut unknown: Vec<&String> = args.keys().filter(|k| !properties.contains_key(*k)).collect();
    unknown.sort();
    for key in unknown {
        violations.push(Violation::new(key.as_str(), "unknown parameter"));
    }

    if !violations.is_empty() {
        return Err(Violations(violations));
    }

    let mut coerced = Map::new();
    for (name, value) in args {
        if value.is_null() {
            continue;
        }
        let prop = &properties[&name];
        match check_value(&value, prop) {
            Ok(v) => {
                coerced.insert(name, v);
            }
            Err(messages) => {
                violations.extend(messages.into_iter().map(|m| Violation::new(name.as_str(), m)));
            }
        }
    }

    if violations.is_empty() {
        Ok(coerced)
    } else {
        Err(Violations(violations))
    }
}

fn check_value(value: &Value, prop: &Value) -> Result<Value, Vec<String>> {
    let coerced = match prop.get("type").and_then(Value::as_str) {
        Some("array") => coerce_array(value, prop.get("items"))?,
        Some(ty) => coerce(value, ty).map_err(|m| vec![m])?,
        None => value.clone(),
    };

    let mut problems = Vec::new();

    if let Some(options) = prop.get("enum").and_then(Value::as_array) {
        let in_enum = |v: &Value| options.contains(v);
        let ok = match &coerced {
            // an enum on an array schema constrains its items
            Value::Array(items) if prop.get("type").and_then(Value::as_str) == Some("array") => {
                items.iter().all(in_enum)
            }
            v => in_enum(v),
        };
        if !ok {
            let listed: Vec<String> = options.iter().map(display).collect();
            problems.push(format!("must be one of: {}", listed.join(", ")));
        }
    }

    if let Some(n) = coerced.as_f64() {
        if let Some(min) = prop.get("minimum").and_then(Value::as_f64) {
            if n < min {
                problems.push(format!("must be >= {min}"));
            }
        }
        if let Some(max) = prop.get("maximum").and_then(Value::as_f64) {
            if n > max {
                problems.push(format!("must be <= {max}"));
            }
        }
    }

    if let Some(s) = coerced.as_str() {
        let len = s.chars().count() as u64;
        if let Some(min) = prop.get("minLength").and_then(Value::as_u64) {
            if len < min {
                problems.push(format!("must be at least {min} characters long"));
            }
        }
        if let Some(max) = prop.get("maxLength").and_then(Value::as_u64) {
            if len > max {
                problems.push(format!("must be at most {max} characters long"));
            }
        }
    }

    if problems.is_empty() {
        Ok(coerced)
    } else {
        Err(problems)
    }
}

fn coerce_array(value: &Value, items: Option<&Value>) -> Result<Value, Vec<String>> {
    let elements: Vec<Value> = match value {
        Value::Array(arr) => arr.clone(),
        // "active,pending" -> ["active", "pending"]
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| Value::String(p.to_string()))
            .collect(),
        Value::Number(_) | Value::Bool(_) => vec![value.clone()],
        other => return Err(vec![format!("expected array, got {}", type_name(other))]),
    };

    let Some(item_type) = items.and_then(|i| i.get("type")).and_then(Value::as_str) else {
        return Ok(Value::Array(elements));
    };

    let mut out = Vec::with_capacity(elements.len());
    let mut problems = Vec::new();
    for (i, element) in elements.iter().enumerate() {
        match coerce(element, item_type) {
            Ok(v) => out.push(v),
            Err(m) => problems.push(format!("item {i}: {m}")),
        }
    }

    if problems.is_empty() {
        Ok(Value::Array(out))
    } else {
        Err(problems)
    }
}

fn coerce(value: &Value, ty: &str) -> Result<Value, String> {
    let mismatch = || format!("expected {ty}, got {}", type_name(value));

    match (ty, value) {
        ("string", Value::String(_))
        | ("number", Value::Number(_))
        | ("boolean", Value::Bool(_))
        | ("object", Value::Object(_)) => Ok(value.clone()),
        ("string", Value::Number(n)) => Ok(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Ok(Value::String(b.to_string())),
        ("integer", Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                return Ok(value.clone());
            }
            match n.as_f64() {
                #[allow(clippy::cast_possible_truncation)]
                Some(f) if f.fract() == 0.0 => Ok(Value::from(f as i64)),
                _ => Err(format!("expected integer, got {n}")),
            }
        }
        ("integer", Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("expected integer, got \"{s}\"")),
        ("number", Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("expected number, got \"{s}\"")),
        ("boolean", Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Value::Bool(true)),
            "false" | "0" | "no" => Ok(Value::Bool(false)),
            _ => Err(format!("expected boolean, got \"{s}\"")),
        },
        ("boolean", Value::Number(n)) => match n.as_i64() {
            Some(1) => Ok(Value::Bool(true)),
            Some(0) => Ok(Value::Bool(false)),
            _ => Err(format!("expected boolean, got {n}")),
        },
        ("string" | "integer" | "number" | "boolean" | "object", _) => Err(mismatch()),
        _ => Ok(value.clone()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => format!("\"{s}\""),
        _ => v.to_string(),
    }
}

fn describe_params(schema: &Value) -> Vec<String> {
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    let required: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    props
        .iter()
        .map(|(name, prop)| {
            let ty = prop.get("type").and_then(Value::as_str).unwrap_or("any");
            let flag = if required.contains(name.as_str()) { ", required" } else { "" };
            match prop.get("description").and_then(Value::as_str) {
                Some(desc) if !desc.is_empty() => format!("{name} ({ty}{flag}): {desc}"),
                _ => format!("{name} ({ty}{flag})"),
            }
        })
        .collect()
}
