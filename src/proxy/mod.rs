//! Egress proxy rotation.

mod pool;
mod probe;

pub use pool::{ProxyPool, ProxyStats, redact};
pub use probe::{DEFAULT_PROBE_URL, test_proxy};
