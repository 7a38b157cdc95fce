//! The signing oracle capability and its serialized adapter.
//!
//! Producing the opaque `x3` token requires running the platform's own script
//! inside a browser context. That context is a single piece of mutable state,
//! so every "read secret, invoke oracle" pair runs under one async mutex.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Failures reported by a signing oracle implementation.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The oracle could not be reached (browser gone, sidecar down).
    #[error("signing oracle unreachable: {0}")]
    Unreachable(String),

    /// The oracle answered but produced no token.
    #[error("signing oracle returned an empty token")]
    EmptyToken,

    /// The oracle answered with something that could not be understood.
    #[error("signing oracle protocol error: {0}")]
    Protocol(String),
}

/// External capability that signs request strings inside a browser context.
#[async_trait]
pub trait SigningOracle: Send + Sync {
    /// Signs `sign_str` (with its MD5 hex `digest`) and returns the opaque token.
    async fn sign(&self, sign_str: &str, digest: &str) -> Result<String, OracleError>;

    /// Reads the auxiliary `b1` secret from the browser's durable storage.
    async fn read_local_secret(&self) -> Result<String, OracleError>;
}

/// Token and secret produced by one exclusive oracle session.
#[derive(Clone, PartialEq, Eq)]
pub struct OracleOutput {
    /// Opaque signed token (`x3`).
    pub token: String,
    /// Auxiliary local-storage secret (`b1`).
    pub local_secret: String,
}

impl std::fmt::Debug for OracleOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleOutput")
            .field("token", &"[REDACTED]")
            .field("local_secret", &"[REDACTED]")
            .finish()
    }
}

/// Mutex-guarded adapter around a shared [`SigningOracle`].
///
/// Concurrent pipeline calls queue on the gate; the guard is released when the
/// call finishes or its future is dropped.
pub struct ExclusiveOracle {
    inner: Arc<dyn SigningOracle>,
    gate: Mutex<()>,
}

impl ExclusiveOracle {
    /// Wraps an oracle so that calls into it are serialized.
    #[must_use]
    pub fn new(inner: Arc<dyn SigningOracle>) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }

    /// Reads the local secret and signs `sign_str` under a single lock.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError`] if either oracle call fails or the token is empty.
    #[instrument(level = "debug", skip_all, fields(digest = %digest))]
    pub async fn sign_exclusive(
        &self,
        sign_str: &str,
        digest: &str,
    ) -> Result<OracleOutput, OracleError> {
        let _guard = self.gate.lock().await;

        let local_secret = self.inner.read_local_secret().await?;
        if local_secret.is_empty() {
            debug!("browser storage has no b1 secret; signing without it");
        }

        let token = self.inner.sign(sign_str, digest).await?;
        if token.trim().is_empty() {
            warn!(digest = %digest, "signing oracle returned empty token");
            return Err(OracleError::EmptyToken);
        }

        Ok(OracleOutput {
            token,
            local_secret,
        })
    }
}

impl std::fmt::Debug for ExclusiveOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusiveOracle").finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    sign_str: &'a str,
    md5: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(default)]
    x3: String,
}

#[derive(Debug, Deserialize)]
struct LocalSecretResponse {
    #[serde(default)]
    b1: String,
}

/// Oracle adapter for a browser-hosted signer reachable over HTTP.
///
/// Protocol: `POST {base}/sign` with `{"sign_str", "md5"}` answers `{"x3"}`;
/// `GET {base}/local-secret` answers `{"b1"}`.
#[derive(Debug, Clone)]
pub struct HttpSigningOracle {
    client: Client,
    base_url: String,
}

impl HttpSigningOracle {
    /// Creates an adapter for the signer at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Unreachable`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SigningOracle for HttpSigningOracle {
    async fn sign(&self, sign_str: &str, digest: &str) -> Result<String, OracleError> {
        let response = self
            .client
            .post(format!("{}/sign", self.base_url))
            .json(&SignRequest {
                sign_str,
                md5: digest,
            })
            .send()
            .await
            .map_err(|e| OracleError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Protocol(format!(
                "signer answered HTTP {}",
                response.status().as_u16()
            )));
        }

        let parsed: SignResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Protocol(e.to_string()))?;
        Ok(parsed.x3)
    }

    async fn read_local_secret(&self) -> Result<String, OracleError> {
        let response = self
            .client
            .get(format!("{}/local-secret", self.base_url))
            .send()
            .await
            .map_err(|e| OracleError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Protocol(format!(
                "signer answered HTTP {}",
                response.status().as_u16()
            )));
        }

        let parsed: LocalSecretResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Protocol(e.to_string()))?;
        Ok(parsed.b1)
    }
}
