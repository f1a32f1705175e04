//! Cluster connection settings
//!
//! A cluster is one Wazuh Manager API endpoint with its own credentials and
//! TLS policy. The registry is built once at startup and never mutated.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::humantime_serde;
use crate::{Error, Result};

/// Connection settings for one manager cluster
#[derive(Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Unique cluster name, matched exactly against the `cluster` tool argument
    pub name: String,
    /// Manager API base URL, e.g. `https://wazuh.local:55000`
    #[serde(alias = "api_url")]
    pub base_url: String,
    /// API username
    pub username: String,
    /// API password
    #[serde(skip_serializing)]
    pub password: String,
    /// Verify the manager's TLS certificate
    #[serde(default = "default_true", alias = "ssl_verify")]
    pub tls_verify: bool,
    /// Per-request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("tls_verify", &self.tls_verify)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClusterConfig {
    /// Join an API path onto the base URL
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("cluster name must not be empty".to_string()));
        }

        let url = Url::parse(&self.base_url).map_err(|e| {
            Error::Config(format!(
                "cluster '{}': invalid base_url '{}': {e}",
                self.name, self.base_url
            ))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "cluster '{}': base_url must use http or https, got '{}'",
                self.name,
                url.scheme()
            )));
        }

        if self.username.is_empty() {
            return Err(Error::Config(format!(
                "cluster '{}': username must not be empty",
                self.name
            )));
        }

        Ok(())
    }
}

/// Ordered, immutable set of configured clusters
#[derive(Debug, Default)]
pub struct ClusterRegistry {
    clusters: Vec<Arc<ClusterConfig>>,
    index: HashMap<String, usize>,
}

impl ClusterRegistry {
    /// Build the registry, rejecting duplicate or malformed entries
    pub fn new(configs: Vec<ClusterConfig>) -> Result<Self> {
        let mut clusters = Vec::with_capacity(configs.len());
        let mut index = HashMap::with_capacity(configs.len());

        for config in configs {
            config.validate()?;
            if index.contains_key(&config.name) {
                return Err(Error::Config(format!(
                    "duplicate cluster name '{}'",
                    config.name
                )));
            }
            index.insert(config.name.clone(), clusters.len());
            clusters.push(Arc::new(config));
        }

        Ok(Self { clusters, index })
    }

    /// Look up a cluster by exact name
    pub fn get(&self, name: &str) -> Result<&Arc<ClusterConfig>> {
        self.index
            .get(name)
            .map(|&i| &self.clusters[i])
            .ok_or_else(|| Error::ClusterNotFound(name.to_string()))
    }

    /// Whether a cluster with this exact name exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Cluster names in configuration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clusters.iter().map(|c| c.name.as_str())
    }

    /// All clusters in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ClusterConfig>> {
        self.clusters.iter()
    }

    /// Number of clusters
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether no cluster is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
