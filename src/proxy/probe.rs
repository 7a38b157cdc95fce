//! Best-effort proxy health probe.

use std::time::Duration;

use reqwest::{Client, Proxy};
use tracing::debug;

use super::pool::redact;

/// Well-known endpoint used when no probe URL is configured.
pub const DEFAULT_PROBE_URL: &str = "https://www.baidu.com";

/// Returns `true` when a GET to `probe_url` through `proxy` succeeds with 2xx
/// within `timeout`. Never errors.
pub async fn test_proxy(proxy: &str, probe_url: &str, timeout: Duration) -> bool {
    let client = match Proxy::all(proxy).and_then(|p| {
        Client::builder()
            .proxy(p)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
    }) {
        Ok(client) => client,
        Err(error) => {
            debug!(proxy = %redact(proxy), %error, "proxy rejected before probing");
            return false;
        }
    };

    match client.get(probe_url).send().await {
        Ok(response) => {
            let healthy = response.status().is_success();
            debug!(
                proxy = %redact(proxy),
                status = response.status().as_u16(),
                healthy,
                "proxy probed"
            );
            healthy
        }
        Err(error) => {
            debug!(proxy = %redact(proxy), %error, "proxy probe failed");
            false
        }
    }
}
