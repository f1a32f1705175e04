//! Tool admission filter.
//!
//! Decides which registered tools are visible at discovery and callable at
//! invocation. The same compiled policy answers both questions so the two
//! can never disagree.

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ToolDefinition;
use crate::{Error, Result};

/// Filter configuration as read from YAML or the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Tool names to hide (case-insensitive).
    pub disabled_tools: Vec<String>,
    /// Categories to hide (case-insensitive).
    pub disabled_categories: Vec<String>,
    /// Regular expressions matched against tool names (case-insensitive).
    pub disabled_regex: Vec<String>,
    /// Hide every tool whose HTTP method is not GET, HEAD or OPTIONS.
    pub read_only: bool,
}

/// Compiled filter policy.
#[derive(Debug, Default)]
pub struct FilterPolicy {
    denied_names: HashSet<String>,
    denied_categories: HashSet<String>,
    denied_name_patterns: Vec<Regex>,
    read_only: bool,
}

impl FilterPolicy {
    /// Compile a policy from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a regular expression does not compile.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let denied_name_patterns = config
            .disabled_regex
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::Config(format!("invalid filter regex '{pattern}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            denied_names: lowercase_set(&config.disabled_tools),
            denied_categories: lowercase_set(&config.disabled_categories),
            denied_name_patterns,
            read_only: config.read_only,
        })
    }

    /// Whether the policy denies anything at all.
    #[must_use]
    pub fn is_permissive(&self) -> bool {
        self.denied_names.is_empty()
            && self.denied_categories.is_empty()
            && self.denied_name_patterns.is_empty()
            && !self.read_only
    }

    /// Whether the tool may appear in discovery.
    #[must_use]
    pub fn is_visible(&self, tool: &ToolDefinition) -> bool {
        self.deny_reason(tool).is_none()
    }

    /// Admission check at invocation time.
    ///
    /// # Errors
    ///
    /// Returns `Error::FilterDenied` naming the rule that matched.
    pub fn check(&self, tool: &ToolDefinition) -> Result<()> {
        match self.deny_reason(tool) {
            None => Ok(()),
            Some(reason) => {
                warn!(tool = %tool.name, reason = %reason, "Tool call blocked by filter");
                Err(Error::FilterDenied {
                    tool: tool.name.clone(),
                    reason,
                })
            }
        }
    }

    /// Evaluation order: name, category, regex, read-only.
    fn deny_reason(&self, tool: &ToolDefinition) -> Option<String> {
        if self.denied_names.contains(&tool.name.to_lowercase()) {
            return Some("disabled by name".to_string());
        }

        let category = tool.metadata.category.to_lowercase();
        if self.denied_categories.contains(&category) {
            return Some(format!("category '{category}' is disabled"));
        }

        if let Some(re) = self
            .denied_name_patterns
            .iter()
            .find(|re| re.is_match(&tool.name))
        {
            return Some(format!("matches disabled pattern '{}'", re.as_str()));
        }

        if self.read_only {
            if let Some(method) = &tool.metadata.http_method {
                if !is_safe_method(method) {
                    return Some(format!("read-only mode blocks {method} tools"));
                }
            }
        }

        None
    }
}

fn lowercase_set(items: &[String]) -> HashSet<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_safe_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS
}
