//! Per-cluster HTTP connection pools

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::cluster::{ClusterConfig, ClusterRegistry};
use crate::{Error, Result};

/// One pooled client per cluster.
///
/// TLS policy and timeout are fixed when the client is built, so a cluster
/// configured with verification on can never be reached without it.
#[derive(Debug)]
pub struct ConnectionPool {
    clients: HashMap<String, Client>,
}

impl ConnectionPool {
    /// Build clients for every cluster in the registry
    pub fn new(clusters: &ClusterRegistry) -> Result<Self> {
        let clients = clusters
            .iter()
            .map(|cluster| Ok((cluster.name.clone(), build_client(cluster)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self { clients })
    }

    /// Client for a cluster
    pub fn client(&self, cluster: &str) -> Result<&Client> {
        self.clients
            .get(cluster)
            .ok_or_else(|| Error::ClusterNotFound(cluster.to_string()))
    }
}

fn build_client(cluster: &ClusterConfig) -> Result<Client> {
    if cluster.tls_verify {
        debug!(cluster = %cluster.name, "Building client with TLS verification");
    } else {
        warn!(cluster = %cluster.name, "TLS certificate verification disabled");
    }

    Client::builder()
        .timeout(cluster.timeout)
        .connect_timeout(cluster.timeout.min(Duration::from_secs(10)))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(30))
        .tcp_nodelay(true)
        .danger_accept_invalid_certs(!cluster.tls_verify)
        .user_agent(concat!("wazuh-mcp-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config(format!("cluster '{}': cannot build HTTP client: {e}", cluster.name)))
}
