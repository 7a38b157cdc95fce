//! Maps transport outcomes and platform responses onto [`ApiError`].
//!
//! Rules apply in priority order:
//!
//! | Signal | Result |
//! |--------|--------|
//! | connection failure / timeout | [`ApiError::Transport`] |
//! | HTTP 461 | [`ApiError::SessionExpired`] (body ignored) |
//! | HTTP 471 | [`ApiError::CaptchaRequired`] from `Verifytype`/`Verifyuuid` |
//! | other non-2xx | [`ApiError::MalformedResponse`] |
//! | body is not a JSON object | [`ApiError::MalformedResponse`] |
//! | `success` falsy, `code == 300012` | [`ApiError::RateLimited`] |
//! | `success` falsy otherwise | [`ApiError::Api`] with `msg` or an excerpt |
//!
//! A successful body yields its `data` field, or the `success` value itself
//! when `data` is absent.

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, warn};

use super::constants::{
    HEADER_VERIFY_TYPE, HEADER_VERIFY_UUID, IP_BLOCKED_CODE, STATUS_CAPTCHA,
    STATUS_SESSION_EXPIRED,
};
use super::error::{ApiError, excerpt};

/// Classifies a failure that happened before any response arrived.
#[must_use]
pub fn classify_transport(uri: &str, error: reqwest::Error) -> ApiError {
    let classified = ApiError::transport(uri, error);
    debug!(uri, error = %classified, "transport failure");
    classified
}

/// Classifies a received response and extracts its logical payload.
///
/// # Errors
///
/// Returns the [`ApiError`] chosen by the priority rules in the module docs.
pub fn classify_response(
    uri: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> Result<Value, ApiError> {
    match status.as_u16() {
        STATUS_SESSION_EXPIRED => {
            warn!(uri, "session rejected by platform");
            return Err(ApiError::session_expired(uri));
        }
        STATUS_CAPTCHA => {
            let verify_type = header_value(headers, HEADER_VERIFY_TYPE);
            let verify_uuid = header_value(headers, HEADER_VERIFY_UUID);
            warn!(uri, ?verify_type, ?verify_uuid, "captcha challenge");
            return Err(ApiError::CaptchaRequired {
                verify_type,
                verify_uuid,
            });
        }
        _ => {}
    }

    if !status.is_success() {
        return Err(ApiError::malformed(status.as_u16(), body));
    }

    let parsed: Value = match serde_json::from_str(body) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Err(ApiError::malformed(status.as_u16(), body)),
    };

    let success = parsed.get("success").cloned().unwrap_or(Value::Null);
    if is_truthy(&success) {
        return Ok(match parsed.get("data") {
            Some(data) => data.clone(),
            None => success,
        });
    }

    let code = parsed.get("code").and_then(Value::as_i64);
    if code == Some(IP_BLOCKED_CODE) {
        warn!(uri, "egress address blocked");
        return Err(ApiError::RateLimited {
            code: IP_BLOCKED_CODE,
        });
    }

    let message = parsed
        .get("msg")
        .and_then(Value::as_str)
        .filter(|msg| !msg.is_empty())
        .map_or_else(|| excerpt(body), str::to_string);
    Err(ApiError::api(code, message))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// JSON truthiness: `false`, `null`, `0`, `""`, `[]` and `{}` are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
