//! Authenticated calls to the manager REST API

pub mod pool;

use std::sync::Arc;

use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

pub use pool::ConnectionPool;

use crate::auth::AuthManager;
use crate::cluster::ClusterRegistry;
use crate::{Error, Result};

/// Upstream error bodies are cut to this many characters
const MAX_ERROR_BODY: usize = 500;

/// Successful upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// HTTP status
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl UpstreamResponse {
    /// Parse the body as JSON
    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.body).map_err(|e| {
            Error::upstream(
                Some(self.status),
                format!("response is not valid JSON: {e}"),
            )
        })
    }
}

/// Executes manager API calls with a valid bearer token.
///
/// A 401 triggers exactly one token replacement and one retry; anything
/// beyond that is reported to the caller.
pub struct UpstreamClient {
    clusters: Arc<ClusterRegistry>,
    pool: Arc<ConnectionPool>,
    auth: Arc<AuthManager>,
}

impl UpstreamClient {
    /// Create a client over shared cluster, pool and auth state
    #[must_use]
    pub fn new(
        clusters: Arc<ClusterRegistry>,
        pool: Arc<ConnectionPool>,
        auth: Arc<AuthManager>,
    ) -> Self {
        Self {
            clusters,
            pool,
            auth,
        }
    }

    /// Issue `method path?query` against a cluster
    pub async fn request(
        &self,
        cluster: &str,
        method: Method,
        path: &str,
        query: &[(String, String)],
    ) -> Result<UpstreamResponse> {
        let config = self.clusters.get(cluster)?;
        let client = self.pool.client(cluster)?;
        let url = config.endpoint(path);

        let token = self.auth.ensure_token(cluster).await?;
        debug!(cluster = %cluster, method = %method, path = %path, "Upstream request");

        let response = send(client, &method, &url, query, &token.value).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return into_result(response).await;
        }

        warn!(cluster = %cluster, path = %path, "Token rejected, refreshing and retrying once");
        drop(response);

        let token = self.auth.refresh_rejected(cluster, &token.value).await?;
        let retry = send(client, &method, &url, query, &token.value).await?;
        into_result(retry).await
    }

    /// GET shorthand
    pub async fn get(
        &self,
        cluster: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Result<UpstreamResponse> {
        self.request(cluster, Method::GET, path, query).await
    }
}

async fn send(
    client: &Client,
    method: &Method,
    url: &str,
    query: &[(String, String)],
    token: &str,
) -> Result<Response> {
    let mut request = client.request(method.clone(), url).bearer_auth(token);
    if !query.is_empty() {
        request = request.query(query);
    }

    request.send().await.map_err(|e| {
        let kind = if e.is_timeout() {
            "timed out"
        } else if e.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };
        Error::upstream(None, format!("{kind}: {e}"))
    })
}

async fn into_result(response: Response) -> Result<UpstreamResponse> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::upstream(Some(status.as_u16()), format!("failed to read body: {e}")))?;

    if status.is_success() {
        Ok(UpstreamResponse {
            status: status.as_u16(),
            body,
        })
    } else {
        Err(Error::upstream(
            Some(status.as_u16()),
            body.chars().take(MAX_ERROR_BODY).collect::<String>(),
        ))
    }
}
