//! Cookie-derived credential sets and the live session handed to the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

/// Anti-forgery cookie that also seeds the signature envelope.
pub const ANTI_FORGERY_COOKIE: &str = "a1";
/// Session token cookie.
pub const SESSION_TOKEN_COOKIE: &str = "web_session";

/// Fallback account key when no session token is present.
const ANONYMOUS_ACCOUNT: &str = "anonymous";

/// Mapping from cookie name to value with unique keys.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSet {
    cookies: BTreeMap<String, String>,
}

impl CredentialSet {
    /// Creates an empty credential set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a browser `Cookie` header string (`a=b; c=d`).
    ///
    /// Entries without `=` or with an empty name are ignored; values may
    /// themselves contain `=`.
    #[must_use]
    pub fn from_cookie_header(header: &str) -> Self {
        let cookies = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { cookies }
    }

    /// Renders the set as a `Cookie` header value.
    #[must_use]
    pub fn to_cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Inserts or replaces one cookie.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    /// Looks up a cookie value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Anti-forgery identifier (`a1`), empty when absent.
    #[must_use]
    pub fn a1(&self) -> &str {
        self.get(ANTI_FORGERY_COOKIE).unwrap_or_default()
    }

    /// Session token (`web_session`), if present.
    #[must_use]
    pub fn web_session(&self) -> Option<&str> {
        self.get(SESSION_TOKEN_COOKIE).filter(|v| !v.is_empty())
    }

    /// True when both the anti-forgery identifier and session token are present.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.a1().is_empty() && self.web_session().is_some()
    }

    /// Loose account key derived from the session token.
    #[must_use]
    pub fn account_id(&self) -> String {
        match self.web_session() {
            Some(token) => {
                let digest = Sha256::digest(token.as_bytes());
                digest[..6].iter().map(|b| format!("{b:02x}")).collect()
            }
            None => ANONYMOUS_ACCOUNT.to_string(),
        }
    }

    /// Applies one `Set-Cookie` header value.
    ///
    /// Only the name/value pair is kept. An empty value, `Max-Age` of zero or
    /// less, or an `Expires` in the past removes the cookie. Returns `true`
    /// when the set changed.
    pub fn apply_set_cookie(&mut self, header: &str) -> bool {
        self.apply_set_cookie_at(header, SystemTime::now())
    }

    fn apply_set_cookie_at(&mut self, header: &str, now: SystemTime) -> bool {
        let mut parts = header.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return false;
        };
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let value = value.trim();
        if value.is_empty() || is_removal(parts, now) {
            let removed = self.cookies.remove(name).is_some();
            if removed {
                debug!(cookie = name, "cookie removed by server");
            }
            return removed;
        }
        if self.get(name) == Some(value) {
            return false;
        }
        self.cookies.insert(name.to_string(), value.to_string());
        true
    }

    /// Number of cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// True when the set holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Cookie names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cookies.keys().map(String::as_str)
    }
}

/// `Max-Age` wins over `Expires` when both are present.
fn is_removal<'a>(attributes: impl Iterator<Item = &'a str>, now: SystemTime) -> bool {
    let mut expires = None;
    for (key, value) in attributes.filter_map(|attr| attr.split_once('=')) {
        let key = key.trim();
        let value = value.trim();
        if key.eq_ignore_ascii_case("max-age") {
            return value.parse::<i64>().is_ok_and(|secs| secs <= 0);
        }
        if key.eq_ignore_ascii_case("expires") {
            expires = httpdate::parse_http_date(value).ok();
        }
    }
    expires.is_some_and(|at| at <= now)
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.cookies.keys().map(|name| (name, "[REDACTED]")))
            .finish()
    }
}

impl FromIterator<(String, String)> for CredentialSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            cookies: iter.into_iter().collect(),
        }
    }
}

/// Live credential set shared by every in-flight request of one process.
///
/// Created at startup from the cache (or a pasted cookie string) and passed
/// explicitly to the pipeline. Responses that rotate cookies update it in place.
#[derive(Debug, Default)]
pub struct Session {
    credentials: RwLock<CredentialSet>,
}

impl Session {
    /// Wraps a credential set.
    #[must_use]
    pub fn new(credentials: CredentialSet) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    /// Copy of the current credential set.
    #[must_use]
    pub fn snapshot(&self) -> CredentialSet {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the credential set wholesale.
    pub fn replace(&self, credentials: CredentialSet) {
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credentials;
    }

    /// Current `Cookie` header value.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .to_cookie_header()
    }

    /// Current anti-forgery identifier (`a1`).
    #[must_use]
    pub fn anti_forgery_id(&self) -> String {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .a1()
            .to_string()
    }

    /// Applies every `Set-Cookie` value; returns how many cookies changed.
    #[instrument(level = "debug", skip_all)]
    pub fn absorb_set_cookies<'a, I>(&self, headers: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut credentials = self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let changed = headers
            .into_iter()
            .filter(|header| credentials.apply_set_cookie(header))
            .count();
        if changed > 0 {
            debug!(changed, "session cookies rotated");
        }
        changed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== CredentialSet Tests ====================

    #[test]
    fn test_from_cookie_header_parses_pairs() {
        let set = CredentialSet::from_cookie_header("a1=abc; web_session=xyz; token=a=b=c");
        assert_eq!(set.a1(), "abc");
        assert_eq!(set.web_session(), Some("xyz"));
        assert_eq!(set.get("token"), Some("a=b=c"));
        assert!(set.is_usable());
    }

    #[test]
    fn test_from_cookie_header_skips_invalid_entries() {
        let set = CredentialSet::from_cookie_header("novalue; =orphan; ; ok=1");
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("ok"), Some("1"));
    }

    #[test]
    fn test_duplicate_names_keep_last_value() {
        let set = CredentialSet::from_cookie_header("a1=old; a1=new");
        assert_eq!(set.len(), 1);
        assert_eq!(set.a1(), "new");
    }

    #[test]
    fn test_not_usable_without_session_token() {
        let set = CredentialSet::from_cookie_header("a1=abc");
        assert!(!set.is_usable());
        let set = CredentialSet::from_cookie_header("web_session=xyz");
        assert!(!set.is_usable());
    }

    #[test]
    fn test_to_cookie_header_round_trip() {
        let set = CredentialSet::from_cookie_header("b=2; a=1");
        assert_eq!(set.to_cookie_header(), "a=1; b=2");
    }

    #[test]
    fn test_account_id_derived_from_token() {
        let a = CredentialSet::from_cookie_header("web_session=one");
        let b = CredentialSet::from_cookie_header("web_session=two");
        assert_eq!(a.account_id().len(), 12);
        assert_ne!(a.account_id(), b.account_id());
        assert_eq!(CredentialSet::new().account_id(), "anonymous");
    }

    #[test]
    fn test_apply_set_cookie_ignores_attributes() {
        let mut set = CredentialSet::new();
        assert!(set.apply_set_cookie("web_session=new; Path=/; HttpOnly; Domain=.example.com"));
        assert_eq!(set.web_session(), Some("new"));
        assert!(!set.apply_set_cookie("web_session=new; Path=/"));
        assert!(!set.apply_set_cookie("garbage"));
    }

    #[test]
    fn test_apply_set_cookie_removes_deleted_cookies() {
        let mut set = CredentialSet::from_cookie_header("a1=x; web_session=old; gid=g; sid=s");

        assert!(set.apply_set_cookie("web_session=; Path=/"));
        assert_eq!(set.get("web_session"), None);
        assert!(!set.is_usable());

        assert!(set.apply_set_cookie("gid=gone; Max-Age=0; Path=/"));
        assert_eq!(set.get("gid"), None);

        assert!(set.apply_set_cookie("sid=gone; Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert_eq!(set.get("sid"), None);

        assert!(!set.apply_set_cookie("missing=; Max-Age=0"));
        assert_eq!(set.to_cookie_header(), "a1=x");
    }

    #[test]
    fn test_apply_set_cookie_keeps_live_cookies() {
        let mut set = CredentialSet::new();
        assert!(set.apply_set_cookie("a=1; Max-Age=3600"));
        assert!(set.apply_set_cookie("b=2; Expires=Fri, 01 Jan 2100 00:00:00 GMT"));
        assert!(set.apply_set_cookie("c=3; Max-Age=60; Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(set.apply_set_cookie("d=4; Expires=not-a-date"));
        assert_eq!(set.to_cookie_header(), "a=1; b=2; c=3; d=4");
    }

    #[test]
    fn test_debug_redacts_values() {
        let set = CredentialSet::from_cookie_header("a1=secret-a1; web_session=secret-ws");
        let rendered = format!("{set:?}");
        assert!(rendered.contains("a1"));
        assert!(!rendered.contains("secret-a1"));
        assert!(!rendered.contains("secret-ws"));
    }

    // ==================== Session Tests ====================

    #[test]
    fn test_session_absorbs_rotated_cookies() {
        let session = Session::new(CredentialSet::from_cookie_header("a1=x; web_session=old"));
        let changed = session.absorb_set_cookies(["web_session=new; Path=/", "a1=x"]);
        assert_eq!(changed, 1);
        assert_eq!(session.snapshot().web_session(), Some("new"));
        assert_eq!(session.anti_forgery_id(), "x");
    }

    #[test]
    fn test_session_drops_deleted_session_token() {
        let session = Session::new(CredentialSet::from_cookie_header("a1=x; web_session=old"));
        let changed = session.absorb_set_cookies(["web_session=; Max-Age=0"]);
        assert_eq!(changed, 1);
        assert_eq!(session.cookie_header(), "a1=x");
    }

    #[test]
    fn test_session_replace() {
        let session = Session::default();
        assert_eq!(session.cookie_header(), "");
        session.replace(CredentialSet::from_cookie_header("a1=1"));
        assert_eq!(session.cookie_header(), "a1=1");
    }
}
