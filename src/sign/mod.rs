//! Signature envelope construction for the platform's request contract.
//!
//! Every API call carries four headers derived from the request itself:
//! `X-S`, `X-T`, `X-S-Common` and `X-B3-Traceid`. The opaque part of `X-S`
//! comes from an external [`SigningOracle`]; everything around it (the sign
//! string, digest, envelopes and checksum) is computed here.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use xhs_core::sign::{HttpMethod, build_sign_string};
//!
//! let post = build_sign_string("/x", HttpMethod::Post, &json!({"a": 1, "b": 2}));
//! assert_eq!(post, r#"/x{"a":1,"b":2}"#);
//!
//! let get = build_sign_string("/y", HttpMethod::Get, &json!({"a": [1, 2]}));
//! assert_eq!(get, "/y?a=1%2C2");
//! ```

mod encoding;
mod oracle;

use std::fmt;
use std::sync::Arc;

use md5::{Digest, Md5};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::client::ApiError;

pub use encoding::{envelope_encode, mrc, now_millis, search_id, trace_id};
pub use oracle::{ExclusiveOracle, HttpSigningOracle, OracleError, OracleOutput, SigningOracle};

/// Envelope version carried in `x0` of the `X-S` envelope.
const XS_VERSION: &str = "4.2.1";
/// Client platform identifier.
const CLIENT_PLATFORM: &str = "xhs-pc-web";
/// Operating system reported to the platform.
const CLIENT_OS: &str = "Mac OS";
/// Prefix prepended to the encoded `X-S` envelope.
const XS_PREFIX: &str = "XYS_";

/// HTTP verb of a signed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Query-string request.
    Get,
    /// JSON body request.
    Post,
}

impl HttpMethod {
    /// Upper-case verb name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header values for exactly one request. Never reuse across requests.
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureMaterial {
    /// Encoded primary envelope (`X-S`).
    pub x_s: String,
    /// Local timestamp in milliseconds (`X-T`).
    pub x_t: String,
    /// Encoded secondary envelope (`X-S-Common`).
    pub x_s_common: String,
    /// Fresh per-request trace id (`X-B3-Traceid`).
    pub trace_id: String,
}

impl fmt::Debug for SignatureMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureMaterial")
            .field("x_s", &"[REDACTED]")
            .field("x_t", &self.x_t)
            .field("x_s_common", &"[REDACTED]")
            .field("trace_id", &self.trace_id)
            .finish()
    }
}

/// Builds the canonical string that the oracle signs.
///
/// POST: `uri` followed by the compact JSON body (a JSON string value is
/// appended raw). GET: `uri` alone when there are no parameters, otherwise
/// `uri?k=v&...` in the caller's key order with every value percent-encoded.
#[must_use]
pub fn build_sign_string(uri: &str, method: HttpMethod, data: &Value) -> String {
    match method {
        HttpMethod::Post => match data {
            Value::Null => uri.to_string(),
            Value::String(raw) => format!("{uri}{raw}"),
            other => format!("{uri}{other}"),
        },
        HttpMethod::Get => match data {
            Value::Object(params) if !params.is_empty() => {
                let query = params
                    .iter()
                    .map(|(key, value)| {
                        format!("{key}={}", urlencoding::encode(&render_query_value(value)))
                    })
                    .collect::<Vec<_>>()
                    .join("&");
                format!("{uri}?{query}")
            }
            _ => uri.to_string(),
        },
    }
}

/// Renders one query parameter value before percent-encoding.
fn render_query_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_query_value)
            .collect::<Vec<_>>()
            .join(","),
        // Numbers, booleans and objects all render as their compact JSON text.
        other => other.to_string(),
    }
}

/// Lower-case hex MD5 of `input`.
#[must_use]
pub fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

#[derive(Serialize)]
struct XsEnvelope<'a> {
    x0: &'a str,
    x1: &'a str,
    x2: &'a str,
    x3: &'a str,
    x4: &'a str,
}

#[derive(Serialize)]
struct XsCommonEnvelope<'a> {
    s0: u8,
    s1: &'a str,
    x0: &'a str,
    x1: &'a str,
    x2: &'a str,
    x3: &'a str,
    x4: &'a str,
    x5: &'a str,
    x6: &'a str,
    x7: &'a str,
    x8: &'a str,
    x9: i64,
    x10: u32,
    x11: &'a str,
}

/// Wraps the oracle token in the versioned `X-S` envelope.
#[must_use]
pub fn encode_xs(token: &str, data_type: &str) -> String {
    let envelope = XsEnvelope {
        x0: XS_VERSION,
        x1: CLIENT_PLATFORM,
        x2: CLIENT_OS,
        x3: token,
        x4: data_type,
    };
    format!("{XS_PREFIX}{}", envelope_encode(&compact_json(&envelope)))
}

/// Builds the `X-S-Common` envelope with its `mrc` checksum over `x_t ++ x_s ++ b1`.
#[must_use]
pub fn encode_xs_common(a1: &str, b1: &str, x_s: &str, x_t: &str) -> String {
    let checksum = mrc(&format!("{x_t}{x_s}{b1}"));
    let envelope = XsCommonEnvelope {
        s0: 3,
        s1: "",
        x0: "1",
        x1: "4.2.2",
        x2: CLIENT_OS,
        x3: CLIENT_PLATFORM,
        x4: "4.74.0",
        x5: a1,
        x6: x_t,
        x7: x_s,
        x8: b1,
        x9: checksum,
        x10: 154,
        x11: "normal",
    };
    envelope_encode(&compact_json(&envelope))
}

fn compact_json<T: Serialize>(value: &T) -> String {
    // Structs of strings and integers always serialize.
    serde_json::to_string(value).unwrap_or_default()
}

/// Produces [`SignatureMaterial`] for a request through a serialized oracle.
///
/// Builders made from clones of one `Arc<ExclusiveOracle>` share its lock, so
/// any number of builders or pipelines can sign through one browser context.
#[derive(Debug, Clone)]
pub struct SignatureEnvelopeBuilder {
    oracle: Arc<ExclusiveOracle>,
}

impl SignatureEnvelopeBuilder {
    /// Creates a builder that signs through the shared `oracle`.
    #[must_use]
    pub fn new(oracle: Arc<ExclusiveOracle>) -> Self {
        Self { oracle }
    }

    /// The serialized oracle this builder signs through.
    #[must_use]
    pub fn oracle(&self) -> &Arc<ExclusiveOracle> {
        &self.oracle
    }

    /// Builds fresh signature material for one request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::SigningUnavailable`] if the oracle cannot be
    /// reached or yields an empty token.
    #[instrument(level = "debug", skip(self, data, a1), fields(method = %method))]
    pub async fn build(
        &self,
        uri: &str,
        method: HttpMethod,
        data: &Value,
        a1: &str,
    ) -> Result<SignatureMaterial, ApiError> {
        let sign_string = build_sign_string(uri, method, data);
        let digest = md5_hex(&sign_string);

        let output = self
            .oracle
            .sign_exclusive(&sign_string, &digest)
            .await
            .map_err(ApiError::signing_unavailable)?;

        let data_type = if data.is_string() { "string" } else { "object" };
        let material = assemble(&output, a1, data_type, now_millis().to_string());
        debug!(x_t = %material.x_t, trace_id = %material.trace_id, "signature built");
        Ok(material)
    }
}

fn assemble(output: &OracleOutput, a1: &str, data_type: &str, x_t: String) -> SignatureMaterial {
    let x_s = encode_xs(&output.token, data_type);
    let x_s_common = encode_xs_common(a1, &output.local_secret, &x_s, &x_t);
    SignatureMaterial {
        x_s,
        x_t,
        x_s_common,
        trace_id: trace_id(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::client::ErrorKind;

    const TOKEN: &str = "mns0101_TOKEN";
    const XS_VECTOR: &str = "XYS_2UQhPsHCH0c1PjhlHjIj2erjwjQhyoPTqBPT49pjHjIj2eHjwjQ+GnPW/MPjNsQhPUHCHfM1qAZlPebKprRNzLhjNsQh+sHCHfRjyfp04sQR";

    struct FixedOracle {
        token: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SigningOracle for FixedOracle {
        async fn sign(&self, _sign_str: &str, _digest: &str) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.token.to_string())
        }

        async fn read_local_secret(&self) -> Result<String, OracleError> {
            Ok("b1v".to_string())
        }
    }

    struct DownOracle;

    #[async_trait]
    impl SigningOracle for DownOracle {
        async fn sign(&self, _sign_str: &str, _digest: &str) -> Result<String, OracleError> {
            Err(OracleError::Unreachable("browser closed".to_string()))
        }

        async fn read_local_secret(&self) -> Result<String, OracleError> {
            Ok(String::new())
        }
    }

    // ==================== Sign String Tests ====================

    #[test]
    fn test_sign_string_post_is_compact_and_ordered() {
        let data = json!({"b": 2, "a": 1});
        assert_eq!(
            build_sign_string("/x", HttpMethod::Post, &data),
            r#"/x{"b":2,"a":1}"#
        );
        assert_eq!(
            build_sign_string("/x", HttpMethod::Post, &json!({"a": 1, "b": 2})),
            r#"/x{"a":1,"b":2}"#
        );
    }

    #[test]
    fn test_sign_string_post_raw_string_body() {
        assert_eq!(
            build_sign_string("/x", HttpMethod::Post, &json!("raw")),
            "/xraw"
        );
    }

    #[test]
    fn test_sign_string_get_joins_lists_with_commas() {
        assert_eq!(
            build_sign_string("/y", HttpMethod::Get, &json!({"a": [1, 2]})),
            "/y?a=1%2C2"
        );
    }

    #[test]
    fn test_sign_string_get_empty_params_is_bare_uri() {
        assert_eq!(build_sign_string("/y", HttpMethod::Get, &json!({})), "/y");
        assert_eq!(build_sign_string("/y", HttpMethod::Get, &Value::Null), "/y");
    }

    #[test]
    fn test_sign_string_get_renders_scalars() {
        let data = json!({
            "note_id": "abc",
            "num": 10,
            "flag": true,
            "empty": null,
            "formats": "jpg,webp",
        });
        assert_eq!(
            build_sign_string("/p", HttpMethod::Get, &data),
            "/p?note_id=abc&num=10&flag=true&empty=&formats=jpg%2Cwebp"
        );
    }

    #[test]
    fn test_sign_string_get_escapes_reserved_bytes() {
        let data = json!({"q": "a b/c=d~e"});
        assert_eq!(
            build_sign_string("/s", HttpMethod::Get, &data),
            "/s?q=a%20b%2Fc%3Dd~e"
        );
    }

    // ==================== Envelope Tests ====================

    #[test]
    fn test_md5_hex_reference_vector() {
        assert_eq!(
            md5_hex(r#"/x{"a":1,"b":2}"#),
            "41fddb6b2e18dbc0be6749088b6957f2"
        );
    }

    #[test]
    fn test_encode_xs_reference_vector() {
        assert_eq!(encode_xs(TOKEN, "object"), XS_VECTOR);
    }

    #[test]
    fn test_encode_xs_common_reference_vector() {
        let encoded = encode_xs_common("a1v", "b1v", XS_VECTOR, "1712345678901");
        assert_eq!(
            encoded,
            "2UQAPsHCPUIjqArjwjHjNsQhPsHCH0rjNsQhPaHCH0c1PjhUHjIj2eHjwjQ+GnPW/MPjNsQhPUHCHdYiqUMIGUM78nHjNsQh+sHCH0c1+Ac1PsHVHdWMH0ijG/b9HjIj2eGjwjHl+ArUPAcM+0qhw/ZlHjIj2eqjwjQGnp+KPSpzybmAar+HPBPlLBkiJrYxaniU8gQx49kzyoS6LbzlcSmL+eSIyDYxaniU8LYx49kztF41Lbq6/pmx/d+zybmpar+H8DFlqLbyJbmSGDTIqSQw2DliyDEALnW3qFYeaB8aydSfqeZFqMbaHjIj2eWjwjQjPgGjNsQhwaHCN/rIPAD9+eHIP/LVHdWlPsHCP/LFNsQhP/rjwjQ1J7QTGnIjKc=="
        );
    }

    #[test]
    fn test_assemble_is_deterministic_except_trace_id() {
        let output = OracleOutput {
            token: TOKEN.to_string(),
            local_secret: "b1v".to_string(),
        };
        let first = assemble(&output, "a1v", "object", "1712345678901".to_string());
        let second = assemble(&output, "a1v", "object", "1712345678901".to_string());
        assert_eq!(first.x_s, XS_VECTOR);
        assert_eq!(first.x_s, second.x_s);
        assert_eq!(first.x_s_common, second.x_s_common);
        assert_ne!(first.trace_id, second.trace_id);
    }

    // ==================== Builder Tests ====================

    #[tokio::test]
    async fn test_builder_produces_fresh_material_per_call() {
        let oracle = Arc::new(FixedOracle {
            token: TOKEN,
            calls: AtomicUsize::new(0),
        });
        let builder =
            SignatureEnvelopeBuilder::new(Arc::new(ExclusiveOracle::new(oracle.clone())));

        let data = json!({"keyword": "coffee"});
        let first = builder
            .build("/api/sns/web/v1/search/notes", HttpMethod::Post, &data, "a1v")
            .await
            .unwrap();
        let second = builder
            .build("/api/sns/web/v1/search/notes", HttpMethod::Post, &data, "a1v")
            .await
            .unwrap();

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
        assert!(first.x_s.starts_with("XYS_"));
        assert_eq!(first.x_t.len(), 13);
        assert_ne!(first.trace_id, second.trace_id);
    }

    #[tokio::test]
    async fn test_builder_surfaces_oracle_failure() {
        let builder =
            SignatureEnvelopeBuilder::new(Arc::new(ExclusiveOracle::new(Arc::new(DownOracle))));
        let err = builder
            .build("/x", HttpMethod::Get, &Value::Null, "a1v")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SigningUnavailable);
    }

    #[tokio::test]
    async fn test_builder_rejects_empty_token() {
        let oracle = Arc::new(FixedOracle {
            token: "",
            calls: AtomicUsize::new(0),
        });
        let builder = SignatureEnvelopeBuilder::new(Arc::new(ExclusiveOracle::new(oracle)));
        let err = builder
            .build("/x", HttpMethod::Get, &Value::Null, "a1v")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SigningUnavailable);
    }

    #[test]
    fn test_signature_material_debug_redacts_envelopes() {
        let material = SignatureMaterial {
            x_s: "XYS_secret".to_string(),
            x_t: "1".to_string(),
            x_s_common: "common_secret".to_string(),
            trace_id: "abc".to_string(),
        };
        let rendered = format!("{material:?}");
        assert!(!rendered.contains("XYS_secret"));
        assert!(!rendered.contains("common_secret"));
    }
}
