use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use xhs_core::sign::{OracleError, SigningOracle};

/// Deterministic oracle that records call counts and overlapping calls.
#[derive(Debug, Default)]
pub struct FakeOracle {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    overlapped: AtomicBool,
    fail: bool,
}

impl FakeOracle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An oracle whose every call fails as unreachable.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Completed `sign` calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// True if two `sign` calls were ever in progress at once.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningOracle for FakeOracle {
    async fn sign(&self, _sign_str: &str, digest: &str) -> Result<String, OracleError> {
        if self.fail {
            return Err(OracleError::Unreachable("browser context closed".to_string()));
        }
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{n}-{}", &digest[..8]))
    }

    async fn read_local_secret(&self) -> Result<String, OracleError> {
        if self.fail {
            return Err(OracleError::Unreachable("browser context closed".to_string()));
        }
        Ok("b1-secret".to_string())
    }
}
