//! Shared browser identity for signed API traffic.
//!
//! The signature envelope claims a desktop browser on macOS, so the transport
//! headers must agree with it.

use crate::client::constants::WEB_ORIGIN;

/// Desktop Chrome on macOS, matching the `Mac OS` platform in the envelope.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent for API requests.
#[must_use]
pub(crate) fn default_api_user_agent() -> String {
    BROWSER_USER_AGENT.to_string()
}

/// Static headers every API request carries besides the signature.
#[must_use]
pub(crate) fn browser_headers() -> [(&'static str, String); 4] {
    [
        ("accept", "application/json, text/plain, */*".to_string()),
        ("accept-language", "zh-CN,zh;q=0.9".to_string()),
        ("origin", WEB_ORIGIN.to_string()),
        ("referer", format!("{WEB_ORIGIN}/")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_claims_macos_chrome() {
        let ua = default_api_user_agent();
        assert!(ua.contains("Macintosh"), "UA must match envelope OS: {ua}");
        assert!(ua.contains("Chrome/"));
    }

    #[test]
    fn test_origin_and_referer_agree() {
        let headers = browser_headers();
        let value = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        assert!(value("referer").starts_with(&value("origin")));
        assert!(!value("origin").is_empty());
    }
}
