#![allow(dead_code)]

pub mod oracle;
pub mod socket_guard;

use std::sync::Arc;
use std::time::Duration;

use xhs_core::client::{PipelineConfig, RequestPipeline, RetryPolicy};
use xhs_core::session::{CredentialSet, Session};
use xhs_core::sign::{ExclusiveOracle, SignatureEnvelopeBuilder};

pub use oracle::FakeOracle;
pub use socket_guard::start_mock_server_or_skip;

/// Cookie string of a logged-in browser.
pub const TEST_COOKIES: &str = "a1=A1VALUE; web_session=old-session";

/// Live session seeded with [`TEST_COOKIES`].
#[must_use]
pub fn test_session() -> Arc<Session> {
    Arc::new(Session::new(CredentialSet::from_cookie_header(TEST_COOKIES)))
}

/// Builder signing through a fresh serialized wrapper around `oracle`.
#[must_use]
pub fn test_signer(oracle: Arc<FakeOracle>) -> SignatureEnvelopeBuilder {
    SignatureEnvelopeBuilder::new(Arc::new(ExclusiveOracle::new(oracle)))
}

/// Pipeline against `api_host` with no retry delay.
#[must_use]
pub fn test_pipeline(
    api_host: &str,
    oracle: Arc<FakeOracle>,
    session: Arc<Session>,
    max_attempts: u32,
    timeout: Duration,
) -> RequestPipeline {
    test_pipeline_with_signer(api_host, test_signer(oracle), session, max_attempts, timeout)
}

/// Pipeline against `api_host` signing through an existing builder.
#[must_use]
pub fn test_pipeline_with_signer(
    api_host: &str,
    signer: SignatureEnvelopeBuilder,
    session: Arc<Session>,
    max_attempts: u32,
    timeout: Duration,
) -> RequestPipeline {
    let config = PipelineConfig {
        api_host: api_host.to_string(),
        timeout,
        retry: RetryPolicy::new(max_attempts, Duration::ZERO),
        ..PipelineConfig::default()
    };
    RequestPipeline::new(config, signer, session).expect("pipeline should build")
}
