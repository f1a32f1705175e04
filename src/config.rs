//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterConfig;
use crate::tool::filter::FilterConfig;
use crate::{Error, Result};

/// Name given to the cluster built from `WAZUH_API_URL` and friends
pub const DEFAULT_CLUSTER_NAME: &str = "default";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Credential lifecycle settings
    pub auth: AuthConfig,
    /// Manager clusters, in order
    pub clusters: Vec<ClusterConfig>,
    /// Tool admission filter
    pub filter: FilterConfig,
    /// Tool output shaping
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // WAZUH_MCP_SERVER__PORT=9000 etc.
        figment = figment.merge(Env::prefixed("WAZUH_MCP_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.apply_env_overrides(|key| env::var(key).ok());
        config.expand_env_vars();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                match dirs::home_dir() {
                    Some(home) => path_str.replacen('~', &home.display().to_string(), 1),
                    None => path_str.clone(),
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!("Env file not found (skipped): {expanded}");
                continue;
            }

            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        }
    }

    /// Apply the `WAZUH_*` variables understood by the single-cluster
    /// deployment and the filter environment knobs.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.clusters.is_empty() {
            if let Some(base_url) = lookup("WAZUH_API_URL").filter(|v| !v.is_empty()) {
                let timeout = lookup("WAZUH_TIMEOUT")
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map_or(Duration::from_secs(30), Duration::from_secs);

                self.clusters.push(ClusterConfig {
                    name: lookup("WAZUH_CLUSTER_NAME")
                        .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string()),
                    base_url,
                    username: lookup("WAZUH_USERNAME").unwrap_or_default(),
                    password: lookup("WAZUH_PASSWORD").unwrap_or_default(),
                    tls_verify: lookup("WAZUH_SSL_VERIFY").is_none_or(|v| is_truthy(&v)),
                    timeout,
                });
            }
        }

        if let Some(v) = lookup("WAZUH_DISABLED_TOOLS") {
            self.filter.disabled_tools.extend(split_list(&v));
        }
        if let Some(v) = lookup("WAZUH_DISABLED_CATEGORIES") {
            self.filter.disabled_categories.extend(split_list(&v));
        }
        if let Some(v) = lookup("WAZUH_DISABLED_TOOLS_REGEX") {
            self.filter.disabled_regex.extend(split_list(&v));
        }
        if let Some(v) = lookup("WAZUH_READ_ONLY") {
            self.filter.read_only = self.filter.read_only || is_truthy(&v);
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in cluster settings
    fn expand_env_vars(&mut self) {
        let Ok(re) = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
            return;
        };

        for cluster in &mut self.clusters {
            cluster.base_url = Self::expand_string(&re, &cluster.base_url);
            cluster.username = Self::expand_string(&re, &cluster.username);
            cluster.password = Self::expand_string(&re, &cluster.password);
        }
    }

    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Upper bound on one inbound request, upstream calls included
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Keep-alive interval for SSE responses
    #[serde(with = "humantime_serde")]
    pub sse_keep_alive: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout: Duration::from_secs(120),
            max_body_size: 1024 * 1024,
            sse_keep_alive: Duration::from_secs(15),
        }
    }
}

/// Credential lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Assumed token lifetime when the token carries no readable `exp` claim
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,
    /// Refresh this long before expiry
    #[serde(with = "humantime_serde")]
    pub refresh_margin: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(900),
            refresh_margin: Duration::from_secs(60),
        }
    }
}

/// Output shaping for tool results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Maximum characters of text returned per content block
    pub max_chars: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { max_chars: 32_000 }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize a bare number of seconds or a string such as "30s", "5m", "100ms"
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(s) => parse(&s).map_err(serde::de::Error::custom),
        }
    }

    /// Parse a duration string
    ///
    /// # Errors
    ///
    /// Returns a message when the string is not a recognised duration.
    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let number = |n: &str| {
            n.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid duration '{s}': {e}"))
        };

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            number(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            number(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            number(mins).map(|m| Duration::from_secs(m * 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            number(hours).map(|h| Duration::from_secs(h * 3600))
        } else {
            number(s).map(Duration::from_secs)
        }
    }
}
