//! Per-cluster access token lifecycle
//!
//! Each cluster owns one token slot guarded by an async mutex. The lock is
//! held across the credential exchange, so concurrent callers that find the
//! token missing or about to expire queue behind a single exchange and then
//! reuse its result, whether it succeeded or failed. Clusters never share a
//! lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::cluster::ClusterRegistry;
use crate::config::AuthConfig;
use crate::upstream::pool::ConnectionPool;
use crate::{Error, Result};

/// Manager endpoint exchanging basic credentials for a JWT
pub const AUTHENTICATE_PATH: &str = "/security/user/authenticate";

/// A bearer token and its validity window
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    /// Raw token value
    pub value: String,
    /// When the token was obtained
    pub issued_at: DateTime<Utc>,
    /// When the manager stops accepting it
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"***")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AuthToken {
    /// Build a token, reading `iat`/`exp` from the JWT payload when present.
    ///
    /// Falls back to `now + lifetime` for opaque or unreadable tokens.
    #[must_use]
    pub fn from_jwt(value: String, now: DateTime<Utc>, lifetime: Duration) -> Self {
        let fallback = now + TimeDelta::from_std(lifetime).unwrap_or(TimeDelta::seconds(900));

        let (issued_at, expires_at) = match decode_claims(&value) {
            Some(claims) => {
                let exp = claims.exp.and_then(|s| DateTime::from_timestamp(s, 0));
                let iat = claims.iat.and_then(|s| DateTime::from_timestamp(s, 0));
                match exp {
                    Some(exp) if exp > now => (iat.unwrap_or(now), exp),
                    _ => (now, fallback),
                }
            }
            None => (now, fallback),
        };

        Self {
            value,
            issued_at,
            expires_at,
        }
    }

    /// True once `now` is within `margin` of expiry
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        now >= self.expires_at - margin
    }

    /// Time left before expiry, zero if already expired
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
    iat: Option<i64>,
}

fn decode_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[derive(Deserialize)]
struct AuthenticateResponse {
    data: AuthenticateData,
}

#[derive(Deserialize)]
struct AuthenticateData {
    token: String,
}

/// Result of the most recent credential exchange
#[derive(Clone)]
enum Outcome {
    Acquired(AuthToken),
    Failed { status: Option<u16>, message: String },
}

impl Outcome {
    fn into_result(self, cluster: &str) -> Result<AuthToken> {
        match self {
            Self::Acquired(token) => Ok(token),
            Self::Failed { status, message } => Err(Error::auth(cluster, status, message)),
        }
    }
}

#[derive(Default)]
struct SlotState {
    token: Option<AuthToken>,
    last: Option<Outcome>,
}

/// Token state of one cluster.
///
/// `generation` counts finished exchanges. Callers read it before queueing
/// on the lock; if it moved by the time they hold the lock, an exchange ran
/// while they waited and they take its outcome, failures included.
#[derive(Default)]
struct TokenSlot {
    generation: AtomicU64,
    state: Mutex<SlotState>,
}

impl TokenSlot {
    async fn lock(&self) -> (MutexGuard<'_, SlotState>, Option<Outcome>) {
        let seen = self.generation.load(Ordering::Acquire);
        let state = self.state.lock().await;
        let settled = if self.generation.load(Ordering::Acquire) == seen {
            None
        } else {
            state.last.clone()
        };
        (state, settled)
    }
}

/// Supplies valid access tokens per cluster
pub struct AuthManager {
    clusters: Arc<ClusterRegistry>,
    pool: Arc<ConnectionPool>,
    slots: HashMap<String, Arc<TokenSlot>>,
    token_lifetime: Duration,
    refresh_margin: TimeDelta,
}

impl AuthManager {
    /// Create a manager with one empty slot per cluster
    #[must_use]
    pub fn new(clusters: Arc<ClusterRegistry>, pool: Arc<ConnectionPool>, config: &AuthConfig) -> Self {
        let slots = clusters
            .names()
            .map(|name| (name.to_string(), Arc::new(TokenSlot::default())))
            .collect();

        Self {
            clusters,
            pool,
            slots,
            token_lifetime: config.token_lifetime,
            refresh_margin: TimeDelta::from_std(config.refresh_margin)
                .unwrap_or(TimeDelta::seconds(60)),
        }
    }

    fn slot(&self, cluster: &str) -> Result<&Arc<TokenSlot>> {
        self.slots
            .get(cluster)
            .ok_or_else(|| Error::ClusterNotFound(cluster.to_string()))
    }

    /// Return a token valid for at least the refresh margin, exchanging
    /// credentials only when the cached one is missing or about to expire.
    pub async fn ensure_token(&self, cluster: &str) -> Result<AuthToken> {
        let slot = self.slot(cluster)?;
        let (mut state, settled) = slot.lock().await;
        if let Some(outcome) = settled {
            return outcome.into_result(cluster);
        }

        if let Some(token) = state
            .token
            .as_ref()
            .filter(|t| !t.needs_refresh(Utc::now(), self.refresh_margin))
        {
            return Ok(token.clone());
        }

        self.refresh_locked(cluster, slot, &mut state).await
    }

    /// Discard the cached token and exchange credentials again.
    ///
    /// An exchange that finished while this call waited for the lock counts
    /// as the refresh.
    pub async fn force_refresh(&self, cluster: &str) -> Result<AuthToken> {
        let slot = self.slot(cluster)?;
        let (mut state, settled) = slot.lock().await;
        if let Some(outcome) = settled {
            return outcome.into_result(cluster);
        }

        state.token = None;
        self.refresh_locked(cluster, slot, &mut state).await
    }

    /// Replace a token the manager rejected.
    ///
    /// When another caller already replaced it, the newer token is returned
    /// without a second exchange.
    pub async fn refresh_rejected(&self, cluster: &str, rejected: &str) -> Result<AuthToken> {
        let slot = self.slot(cluster)?;
        let (mut state, settled) = slot.lock().await;
        if let Some(outcome) = settled {
            debug!(cluster = %cluster, "Exchange finished while waiting");
            return outcome.into_result(cluster);
        }

        if let Some(token) = state.token.as_ref().filter(|t| {
            t.value != rejected && !t.needs_refresh(Utc::now(), self.refresh_margin)
        }) {
            debug!(cluster = %cluster, "Rejected token already replaced");
            return Ok(token.clone());
        }

        state.token = None;
        self.refresh_locked(cluster, slot, &mut state).await
    }

    /// Cached token, if any, without refreshing
    pub async fn cached(&self, cluster: &str) -> Option<AuthToken> {
        let slot = self.slots.get(cluster)?;
        slot.state.lock().await.token.clone()
    }

    async fn refresh_locked(
        &self,
        cluster: &str,
        slot: &TokenSlot,
        state: &mut SlotState,
    ) -> Result<AuthToken> {
        let result = self.exchange(cluster).await;

        let outcome = match &result {
            Ok(token) => {
                info!(
                    cluster = %cluster,
                    expires_in_secs = token.remaining(Utc::now()).as_secs(),
                    "Access token acquired"
                );
                state.token = Some(token.clone());
                Outcome::Acquired(token.clone())
            }
            Err(e) => {
                warn!(cluster = %cluster, error = %e, "Credential exchange failed");
                state.token = None;
                match e {
                    Error::Auth {
                        status, message, ..
                    } => Outcome::Failed {
                        status: *status,
                        message: message.clone(),
                    },
                    other => Outcome::Failed {
                        status: None,
                        message: other.to_string(),
                    },
                }
            }
        };

        state.last = Some(outcome);
        slot.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn exchange(&self, cluster: &str) -> Result<AuthToken> {
        let config = self.clusters.get(cluster)?;
        let client = self.pool.client(cluster)?;

        debug!(cluster = %cluster, user = %config.username, "Exchanging credentials");

        let response = client
            .post(config.endpoint(AUTHENTICATE_PATH))
            .basic_auth(&config.username, Some(&config.password))
            .send()
            .await
            .map_err(|e| Error::auth(cluster, None, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(
                cluster,
                Some(status.as_u16()),
                format!(
                    "manager returned {status}: {}",
                    body.chars().take(500).collect::<String>()
                ),
            ));
        }

        let parsed: AuthenticateResponse = response.json().await.map_err(|e| {
            Error::auth(
                cluster,
                Some(status.as_u16()),
                format!("malformed authentication response: {e}"),
            )
        })?;

        if parsed.data.token.is_empty() {
            return Err(Error::auth(
                cluster,
                Some(status.as_u16()),
                "authentication response contained an empty token",
            ));
        }

        Ok(AuthToken::from_jwt(
            parsed.data.token,
            Utc::now(),
            self.token_lifetime,
        ))
    }
}
