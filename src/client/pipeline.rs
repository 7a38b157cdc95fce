//! Signed request pipeline: sign, attach cookies, pick a proxy, send, classify, retry.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE, USER_AGENT};
use reqwest::{Client, Proxy, RequestBuilder};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::classify::{classify_response, classify_transport};
use super::constants::{DEFAULT_API_HOST, DEFAULT_TIMEOUT, JSON_CONTENT_TYPE};
use super::error::ApiError;
use super::retry::{RetryDecision, RetryPolicy};
use crate::proxy::ProxyPool;
use crate::session::Session;
use crate::sign::{HttpMethod, SignatureEnvelopeBuilder, SignatureMaterial, build_sign_string};
use crate::user_agent;

/// Transport settings for [`RequestPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Scheme and host prepended to every API path.
    pub api_host: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempt bound and inter-attempt delay.
    pub retry: RetryPolicy,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_API_HOST.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            user_agent: user_agent::default_api_user_agent(),
        }
    }
}

/// Executes signed API calls on behalf of every logical operation.
///
/// One instance is shared (behind `Arc`) by concurrent operations. Oracle
/// access is serialized inside the signer, and the proxy pool and session carry
/// their own locks.
#[derive(Debug)]
pub struct RequestPipeline {
    config: PipelineConfig,
    signer: SignatureEnvelopeBuilder,
    session: Arc<Session>,
    proxies: Option<Arc<ProxyPool>>,
    direct: Client,
    proxied: DashMap<String, Client>,
}

impl RequestPipeline {
    /// Creates a pipeline that talks to the API directly.
    ///
    /// # Errors
    ///
    /// Returns the client error if the HTTP client cannot be built.
    pub fn new(
        config: PipelineConfig,
        signer: SignatureEnvelopeBuilder,
        session: Arc<Session>,
    ) -> Result<Self, reqwest::Error> {
        let direct = build_client(&config, None)?;
        Ok(Self {
            config,
            signer,
            session,
            proxies: None,
            direct,
            proxied: DashMap::new(),
        })
    }

    /// Routes every call through proxies drawn from `pool`.
    #[must_use]
    pub fn with_proxy_pool(mut self, pool: Arc<ProxyPool>) -> Self {
        self.proxies = Some(pool);
        self
    }

    /// The live session this pipeline signs with.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// The proxy pool, when configured.
    #[must_use]
    pub fn proxy_pool(&self) -> Option<&Arc<ProxyPool>> {
        self.proxies.as_ref()
    }

    /// Pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Signed GET with query parameters.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn get(&self, uri: &str, params: &Value) -> Result<Value, ApiError> {
        self.execute(HttpMethod::Get, uri, params).await
    }

    /// Signed POST with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn post(&self, uri: &str, body: &Value) -> Result<Value, ApiError> {
        self.execute(HttpMethod::Post, uri, body).await
    }

    /// Runs one logical request, retrying transport failures only.
    ///
    /// Each attempt builds a fresh signature. A proxy that fails at the
    /// transport level is marked failed before the next attempt.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] of the last attempt.
    #[instrument(skip(self, data), fields(method = %method))]
    pub async fn execute(
        &self,
        method: HttpMethod,
        uri: &str,
        data: &Value,
    ) -> Result<Value, ApiError> {
        let mut attempt = 1;
        loop {
            let error = match self.attempt(method, uri, data).await {
                Ok(payload) => {
                    debug!(attempt, "request succeeded");
                    return Ok(payload);
                }
                Err(error) => error,
            };

            match self.config.retry.should_retry(error.kind(), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(
                        attempt,
                        next_attempt = next,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "retrying after transport failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    info!(attempt, kind = %error.kind(), reason = %reason, "request failed");
                    return Err(error);
                }
            }
        }
    }

    async fn attempt(&self, method: HttpMethod, uri: &str, data: &Value) -> Result<Value, ApiError> {
        let a1 = self.session.anti_forgery_id();
        let material = self.signer.build(uri, method, data, &a1).await?;

        let proxy = self.proxies.as_ref().and_then(|pool| pool.get_next());
        let outcome = self.send(method, uri, data, &material, proxy.as_deref()).await;

        if let (Err(error), Some(proxy), Some(pool)) = (&outcome, &proxy, &self.proxies) {
            if error.is_retryable() {
                pool.mark_failed(proxy);
            }
        }
        outcome
    }

    async fn send(
        &self,
        method: HttpMethod,
        uri: &str,
        data: &Value,
        material: &SignatureMaterial,
        proxy: Option<&str>,
    ) -> Result<Value, ApiError> {
        let client = self
            .client_for(proxy)
            .map_err(|error| classify_transport(uri, error))?;

        let request = match method {
            HttpMethod::Get => {
                // The query string sent must be byte-identical to the one signed.
                let target = build_sign_string(uri, method, data);
                client.get(format!("{}{target}", self.config.api_host))
            }
            HttpMethod::Post => client
                .post(format!("{}{uri}", self.config.api_host))
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(post_body(data)),
        };

        let response = self
            .decorate(request, material)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|error| classify_transport(uri, error))?;

        let status = response.status();
        let headers = response.headers().clone();
        self.session.absorb_set_cookies(
            headers
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );

        let body = response
            .text()
            .await
            .map_err(|error| classify_transport(uri, error))?;
        debug!(status = status.as_u16(), bytes = body.len(), "response received");

        classify_response(uri, status, &headers, &body)
    }

    fn decorate(&self, mut request: RequestBuilder, material: &SignatureMaterial) -> RequestBuilder {
        for (name, value) in user_agent::browser_headers() {
            request = request.header(name, value);
        }
        request = request
            .header(USER_AGENT, &self.config.user_agent)
            .header("X-S", &material.x_s)
            .header("X-T", &material.x_t)
            .header("X-S-Common", &material.x_s_common)
            .header("X-B3-Traceid", &material.trace_id);

        let cookie = self.session.cookie_header();
        if !cookie.is_empty() {
            request = request.header(COOKIE, cookie);
        }
        request
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };
        if let Some(client) = self.proxied.get(proxy) {
            return Ok(client.clone());
        }
        let client = build_client(&self.config, Some(proxy))?;
        self.proxied.insert(proxy.to_string(), client.clone());
        Ok(client)
    }
}

/// POST body: a JSON string value is sent raw, anything else as compact JSON.
fn post_body(data: &Value) -> String {
    match data {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn build_client(config: &PipelineConfig, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.timeout)
        .gzip(true);
    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }
    builder.build()
}
