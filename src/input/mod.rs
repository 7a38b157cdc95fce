//! Normalization of user-supplied note and user references.
//!
//! Accepts bare 24-hex identifiers, full web URLs (carrying `xsec_token` and
//! `xsec_source` query parameters), and `xhslink.com` short links, which must
//! be resolved over the network before they can be parsed.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

/// Bare platform identifier: 24 lowercase hex characters.
#[allow(clippy::expect_used)]
static BARE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{24}$").expect("bare id regex is valid"));

/// Separators between entries of a batch input.
#[allow(clippy::expect_used)]
static BATCH_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,\n\r]+").expect("batch separator regex is valid"));

/// Host suffix of the platform's link shortener.
const SHORT_LINK_HOST: &str = "xhslink.com";

/// Path marker of user profile links.
const USER_PROFILE_MARKER: &str = "/user/profile/";

/// Errors normalizing an identifier or URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// Input was blank.
    #[error("input is empty")]
    Empty,
    /// Input is neither a bare id nor a parseable URL.
    #[error("not a note/user id or URL: {0}")]
    Unrecognized(String),
    /// URL carries no identifier segment.
    #[error("no identifier found in URL: {0}")]
    MissingId(String),
}

/// Note identifier plus the access tokens that travel with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteLocator {
    /// Note id.
    pub note_id: String,
    /// Per-resource security token (may be empty).
    pub xsec_token: String,
    /// Where the token was obtained (may be empty).
    pub xsec_source: String,
}

impl NoteLocator {
    /// Locator with no security token.
    pub fn bare(note_id: impl Into<String>) -> Self {
        Self {
            note_id: note_id.into(),
            ..Self::default()
        }
    }
}

/// User identifier plus optional access tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserLocator {
    /// User id.
    pub user_id: String,
    /// Security token from the profile link (may be empty).
    pub xsec_token: String,
    /// Source of the token (may be empty).
    pub xsec_source: String,
}

/// A recognized note reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteRef {
    /// Bare identifier without tokens.
    Id(String),
    /// Full URL with its parsed locator.
    Url(NoteLocator),
    /// Short link that must be followed to find the real URL.
    ShortLink(String),
}

impl NoteRef {
    /// Locator for ids and URLs; `None` for unresolved short links.
    #[must_use]
    pub fn locator(&self) -> Option<NoteLocator> {
        match self {
            Self::Id(id) => Some(NoteLocator::bare(id.clone())),
            Self::Url(locator) => Some(locator.clone()),
            Self::ShortLink(_) => None,
        }
    }
}

/// Entries recognized in a batch input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchInput {
    /// Note references in input order.
    pub notes: Vec<NoteRef>,
    /// User references in input order.
    pub users: Vec<UserLocator>,
    /// Entries that could not be recognized, with the reason.
    pub invalid: Vec<(String, InputError)>,
}

/// True for a bare 24-hex identifier.
#[must_use]
pub fn is_bare_id(input: &str) -> bool {
    BARE_ID_PATTERN.is_match(input)
}

/// Recognizes a note id, note URL or short link.
///
/// # Errors
///
/// Returns [`InputError`] for blank input, unparseable URLs or URLs without an id.
///
/// # Examples
///
/// ```
/// use xhs_core::input::{NoteRef, parse_note_ref};
///
/// let parsed = parse_note_ref(
///     "https://www.xiaohongshu.com/explore/674c5e32000000001e019dd1?xsec_token=AB&xsec_source=pc_feed",
/// )
/// .unwrap();
/// let locator = parsed.locator().unwrap();
/// assert_eq!(locator.note_id, "674c5e32000000001e019dd1");
/// assert_eq!(locator.xsec_token, "AB");
/// ```
pub fn parse_note_ref(input: &str) -> Result<NoteRef, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InputError::Empty);
    }
    if is_bare_id(input) {
        return Ok(NoteRef::Id(input.to_string()));
    }

    let url = parse_lenient_url(input)?;
    if is_short_link(&url) {
        trace!(url = %url, "short link recognized");
        return Ok(NoteRef::ShortLink(url.to_string()));
    }

    let note_id = last_segment(&url).ok_or_else(|| InputError::MissingId(input.to_string()))?;
    Ok(NoteRef::Url(NoteLocator {
        note_id,
        xsec_token: query_value(&url, "xsec_token"),
        xsec_source: query_value(&url, "xsec_source"),
    }))
}

/// Parses a note URL (used after a short link has been followed).
///
/// # Errors
///
/// Returns [`InputError`] when no note id can be found.
pub fn parse_note_url(input: &str) -> Result<NoteLocator, InputError> {
    match parse_note_ref(input)? {
        NoteRef::ShortLink(link) => Err(InputError::MissingId(link)),
        other => other
            .locator()
            .ok_or_else(|| InputError::MissingId(input.to_string())),
    }
}

/// Recognizes a user id or profile URL.
///
/// The id is the segment after `profile`, else the last path segment.
///
/// # Errors
///
/// Returns [`InputError`] for blank input, unparseable URLs or URLs without an id.
pub fn parse_user_ref(input: &str) -> Result<UserLocator, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InputError::Empty);
    }
    if is_bare_id(input) {
        return Ok(UserLocator {
            user_id: input.to_string(),
            ..UserLocator::default()
        });
    }

    let url = parse_lenient_url(input)?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let after_profile = segments
        .iter()
        .position(|segment| *segment == "profile")
        .and_then(|index| segments.get(index + 1));
    let user_id = after_profile
        .or_else(|| segments.last())
        .map(|segment| (*segment).to_string())
        .ok_or_else(|| InputError::MissingId(input.to_string()))?;

    Ok(UserLocator {
        user_id,
        xsec_token: query_value(&url, "xsec_token"),
        xsec_source: query_value(&url, "xsec_source"),
    })
}

/// Splits free text on commas and newlines into note and user references.
///
/// Profile links become users; everything else is treated as a note. Blank
/// entries are skipped and unrecognized ones collected in
/// [`BatchInput::invalid`].
#[tracing::instrument(skip(text), fields(input_len = text.len()))]
#[must_use]
pub fn parse_batch(text: &str) -> BatchInput {
    let mut batch = BatchInput::default();
    for entry in BATCH_SEPARATOR.split(text) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if entry.contains(USER_PROFILE_MARKER) {
            match parse_user_ref(entry) {
                Ok(user) => batch.users.push(user),
                Err(error) => batch.invalid.push((entry.to_string(), error)),
            }
        } else {
            match parse_note_ref(entry) {
                Ok(note) => batch.notes.push(note),
                Err(error) => batch.invalid.push((entry.to_string(), error)),
            }
        }
    }
    debug!(
        notes = batch.notes.len(),
        users = batch.users.len(),
        invalid = batch.invalid.len(),
        "batch input parsed"
    );
    batch
}

/// Parses `input` as a URL, adding `https://` when the scheme is missing.
fn parse_lenient_url(input: &str) -> Result<Url, InputError> {
    match Url::parse(input) {
        Ok(url) if url.has_host() => Ok(url),
        _ if !input.contains("://") && input.contains('.') => Url::parse(&format!("https://{input}"))
            .ok()
            .filter(Url::has_host)
            .ok_or_else(|| InputError::Unrecognized(input.to_string())),
        _ => Err(InputError::Unrecognized(input.to_string())),
    }
}

fn is_short_link(url: &Url) -> bool {
    url.host_str().is_some_and(|host| {
        host == SHORT_LINK_HOST || host.ends_with(&format!(".{SHORT_LINK_HOST}"))
    })
}

fn last_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
}

fn query_value(url: &Url, key: &str) -> String {
    url.query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOTE_ID: &str = "674c5e32000000001e019dd1";
    const USER_ID: &str = "5a87c9134eacab2a4db1a0fb";

    // ==================== Note Reference Tests ====================

    #[test]
    fn test_bare_id_recognized() {
        assert_eq!(
            parse_note_ref(&format!("  {NOTE_ID} ")).unwrap(),
            NoteRef::Id(NOTE_ID.to_string())
        );
    }

    #[test]
    fn test_uppercase_hex_is_not_bare_id() {
        assert!(!is_bare_id(&NOTE_ID.to_uppercase()));
    }

    #[test]
    fn test_note_url_variants() {
        for url in [
            format!("https://www.xiaohongshu.com/explore/{NOTE_ID}"),
            format!("https://www.xiaohongshu.com/discovery/item/{NOTE_ID}"),
            format!("https://www.xiaohongshu.com/notes/{NOTE_ID}/"),
            format!("www.xiaohongshu.com/explore/{NOTE_ID}"),
        ] {
            let locator = parse_note_url(&url).unwrap();
            assert_eq!(locator.note_id, NOTE_ID, "url: {url}");
            assert!(locator.xsec_token.is_empty());
        }
    }

    #[test]
    fn test_note_url_extracts_tokens() {
        let url = format!(
            "https://www.xiaohongshu.com/explore/{NOTE_ID}?xsec_token=ABC%3D&xsec_source=pc_feed"
        );
        let locator = parse_note_url(&url).unwrap();
        assert_eq!(locator.xsec_token, "ABC=");
        assert_eq!(locator.xsec_source, "pc_feed");
    }

    #[test]
    fn test_short_link_recognized() {
        let parsed = parse_note_ref("http://xhslink.com/a/AbCdEf").unwrap();
        assert!(matches!(parsed, NoteRef::ShortLink(_)));
        assert!(parsed.locator().is_none());
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(parse_note_ref("   "), Err(InputError::Empty));
        assert!(matches!(
            parse_note_ref("hello world"),
            Err(InputError::Unrecognized(_))
        ));
        assert!(matches!(
            parse_note_ref("https://www.xiaohongshu.com/"),
            Err(InputError::MissingId(_))
        ));
    }

    // ==================== User Reference Tests ====================

    #[test]
    fn test_user_profile_url() {
        let user = parse_user_ref(&format!(
            "https://www.xiaohongshu.com/user/profile/{USER_ID}?xsec_token=T1&xsec_source=pc_note"
        ))
        .unwrap();
        assert_eq!(user.user_id, USER_ID);
        assert_eq!(user.xsec_token, "T1");
        assert_eq!(user.xsec_source, "pc_note");
    }

    #[test]
    fn test_user_bare_id_and_fallback_segment() {
        assert_eq!(parse_user_ref(USER_ID).unwrap().user_id, USER_ID);
        assert_eq!(
            parse_user_ref("https://example.com/people/abc").unwrap().user_id,
            "abc"
        );
    }

    // ==================== Batch Tests ====================

    #[test]
    fn test_batch_splits_on_commas_and_newlines() {
        let text = format!(
            "{NOTE_ID},\nhttps://www.xiaohongshu.com/user/profile/{USER_ID}\r\n\n , https://www.xiaohongshu.com/explore/{NOTE_ID}?xsec_token=X, not a link"
        );
        let batch = parse_batch(&text);
        assert_eq!(batch.notes.len(), 2);
        assert_eq!(batch.users.len(), 1);
        assert_eq!(batch.users[0].user_id, USER_ID);
        assert_eq!(batch.invalid.len(), 1);
        assert_eq!(batch.invalid[0].0, "not a link");
    }

    #[test]
    fn test_batch_empty_input() {
        assert_eq!(parse_batch(" \n,,\r\n"), BatchInput::default());
    }
}
