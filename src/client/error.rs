//! Error taxonomy for signed API calls.
//!
//! Every failure of a logical request ends up as one [`ApiError`]. Only
//! [`ApiError::Transport`] is worth retrying locally; the other kinds need new
//! credentials, a solved captcha, a different egress address or a code fix.

use serde::Serialize;
use thiserror::Error;

use crate::sign::OracleError;

/// Failure of a signed API call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The signing oracle could not produce a signature.
    #[error("signing unavailable: {reason}")]
    SigningUnavailable {
        /// Why the oracle failed.
        reason: String,
    },

    /// The credential set is stale (HTTP 461); re-authenticate before retrying.
    #[error("session expired calling {uri}; re-authenticate and retry")]
    SessionExpired {
        /// The API path that rejected the session.
        uri: String,
    },

    /// The platform demands a captcha (HTTP 471).
    #[error("captcha required (type {verify_type:?}, challenge {verify_uuid:?})")]
    CaptchaRequired {
        /// Verification type from the `Verifytype` header.
        verify_type: Option<String>,
        /// Challenge id from the `Verifyuuid` header.
        verify_uuid: Option<String>,
    },

    /// The egress address is rate limited or blocked.
    #[error("rate limited or IP blocked (code {code})")]
    RateLimited {
        /// Application error code reported by the platform.
        code: i64,
    },

    /// Non-2xx status or a body that is not the expected JSON envelope.
    #[error("malformed response (HTTP {status}): {excerpt}")]
    MalformedResponse {
        /// HTTP status code of the response.
        status: u16,
        /// Truncated raw body.
        excerpt: String,
    },

    /// The platform reported an application-level failure.
    #[error("api error{}: {message}", .code.map_or_else(String::new, |c| format!(" {c}")))]
    Api {
        /// Application error code, when present.
        code: Option<i64>,
        /// Message from the body, or a truncated excerpt.
        message: String,
    },

    /// Connection or timeout failure before a response arrived.
    #[error("transport error calling {uri}: {source}")]
    Transport {
        /// The API path being called.
        uri: String,
        /// Whether the request exceeded its timeout.
        timed_out: bool,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },
}

/// Flat classification of an [`ApiError`], for reports and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`ApiError::SigningUnavailable`].
    SigningUnavailable,
    /// See [`ApiError::SessionExpired`].
    SessionExpired,
    /// See [`ApiError::CaptchaRequired`].
    CaptchaRequired,
    /// See [`ApiError::RateLimited`].
    RateLimited,
    /// See [`ApiError::MalformedResponse`].
    MalformedResponse,
    /// See [`ApiError::Api`].
    Api,
    /// See [`ApiError::Transport`].
    Transport,
}

impl ErrorKind {
    /// Snake-case name used in reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SigningUnavailable => "signing_unavailable",
            Self::SessionExpired => "session_expired",
            Self::CaptchaRequired => "captcha_required",
            Self::RateLimited => "rate_limited",
            Self::MalformedResponse => "malformed_response",
            Self::Api => "api",
            Self::Transport => "transport",
        }
    }

    /// True for kinds that require new credentials or human action.
    #[must_use]
    pub fn needs_reauth(self) -> bool {
        matches!(self, Self::SessionExpired | Self::CaptchaRequired)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ApiError {
    /// Lifts an oracle failure.
    #[must_use]
    pub fn signing_unavailable(source: OracleError) -> Self {
        Self::SigningUnavailable {
            reason: source.to_string(),
        }
    }

    /// Creates a session-expired error for `uri`.
    pub fn session_expired(uri: impl Into<String>) -> Self {
        Self::SessionExpired { uri: uri.into() }
    }

    /// Creates a malformed-response error, truncating `body` into an excerpt.
    #[must_use]
    pub fn malformed(status: u16, body: &str) -> Self {
        Self::MalformedResponse {
            status,
            excerpt: excerpt(body),
        }
    }

    /// Creates an application-level error.
    pub fn api(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(uri: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            uri: uri.into(),
            timed_out: source.is_timeout(),
            source,
        }
    }

    /// Flat kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SigningUnavailable { .. } => ErrorKind::SigningUnavailable,
            Self::SessionExpired { .. } => ErrorKind::SessionExpired,
            Self::CaptchaRequired { .. } => ErrorKind::CaptchaRequired,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::Api { .. } => ErrorKind::Api,
            Self::Transport { .. } => ErrorKind::Transport,
        }
    }

    /// Whether a local retry can help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

/// Truncates `body` to [`EXCERPT_LIMIT`](super::constants::EXCERPT_LIMIT) characters.
#[must_use]
pub fn excerpt(body: &str) -> String {
    let limit = super::constants::EXCERPT_LIMIT;
    if body.chars().count() <= limit {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(limit).collect();
    cut.push('…');
    cut
}
