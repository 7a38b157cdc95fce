//! Canonical records decoded from the platform's loosely-typed responses.
//!
//! Endpoints disagree on key names for the same logical field. Each decoder
//! below lists its fallbacks in order and always yields one canonical shape;
//! nothing past this module looks at raw JSON.

use serde::Serialize;
use serde_json::Value;

/// Fallback for absent display counts.
const ZERO_COUNT: &str = "0";

/// One page of a cursor-paged listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Items in server order.
    pub items: Vec<T>,
    /// Opaque continuation token; echo it verbatim.
    pub cursor: String,
    /// `false` means no further page exists.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// A terminal page with no items.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            cursor: String::new(),
            has_more: false,
        }
    }

    /// Decodes `{<items_key>: [...], cursor, has_more}` with `decode` per item.
    ///
    /// Items the decoder rejects are skipped. The cursor may be a string or a
    /// number.
    pub fn decode(payload: &Value, items_key: &str, decode: impl Fn(&Value) -> Option<T>) -> Self {
        let items = payload
            .get(items_key)
            .and_then(Value::as_array)
            .map(|raw| raw.iter().filter_map(&decode).collect())
            .unwrap_or_default();
        Self {
            items,
            cursor: payload.get("cursor").map(scalar_string).unwrap_or_default(),
            has_more: payload
                .get("has_more")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// Author or commenter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserRef {
    /// User id.
    pub user_id: String,
    /// Display name (`nickname` → `nick_name`).
    pub nickname: String,
    /// Avatar URL (`image` → `avatar`).
    pub avatar: String,
}

impl UserRef {
    /// Decodes a user object; empty record for `None` or non-objects.
    #[must_use]
    pub fn decode(value: Option<&Value>) -> Self {
        let Some(value) = value.filter(|v| v.is_object()) else {
            return Self::default();
        };
        Self {
            user_id: first_string(value, &["user_id", "userid", "id"]),
            nickname: first_string(value, &["nickname", "nick_name"]),
            avatar: first_string(value, &["image", "avatar"]),
        }
    }
}

/// Note as it appears in search results and user listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteSummary {
    /// Note id (`id` → `note_id`).
    pub note_id: String,
    /// Token needed to open the note.
    pub xsec_token: String,
    /// Title (`display_title` → `title`).
    pub title: String,
    /// `normal` (image) or `video`.
    pub note_type: String,
    /// Cover image (`cover.url_default` → `cover.url`).
    pub cover_url: String,
    /// Author.
    pub author: UserRef,
    /// Display like count, `"0"` when absent.
    pub liked_count: String,
}

impl NoteSummary {
    /// Decodes a search item (`{id, xsec_token, note_card}`) or a flat user-listing note.
    ///
    /// Search items whose `model_type` is not `note` (query suggestions) yield `None`.
    #[must_use]
    pub fn decode(value: &Value) -> Option<Self> {
        if let Some(model_type) = value.get("model_type").and_then(Value::as_str) {
            if model_type != "note" {
                return None;
            }
        }
        let card = value.get("note_card").unwrap_or(value);
        let note_id = non_empty(first_string(value, &["id", "note_id"]))
            .or_else(|| non_empty(first_string(card, &["note_id", "id"])))?;

        Some(Self {
            note_id,
            xsec_token: non_empty(first_string(value, &["xsec_token"]))
                .unwrap_or_else(|| first_string(card, &["xsec_token"])),
            title: first_string(card, &["display_title", "title"]),
            note_type: first_string(card, &["type"]),
            cover_url: card
                .get("cover")
                .map(|cover| first_string(cover, &["url_default", "url"]))
                .unwrap_or_default(),
            author: UserRef::decode(card.get("user")),
            liked_count: display_count(card.get("interact_info"), "liked_count"),
        })
    }
}

/// Full note from the feed endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteDetail {
    /// Note id.
    pub note_id: String,
    /// `normal` (image) or `video`.
    pub note_type: String,
    /// Title (`title` → `display_title`).
    pub title: String,
    /// Body text.
    pub description: String,
    /// Author.
    pub author: UserRef,
    /// Display like count.
    pub liked_count: String,
    /// Display collect count.
    pub collected_count: String,
    /// Display comment count.
    pub comment_count: String,
    /// Display share count.
    pub share_count: String,
    /// Image URLs (`url_default` → `url` per image).
    pub images: Vec<String>,
    /// First H.264 stream (`video.media.stream.h264[0].master_url`).
    pub video_url: Option<String>,
    /// Topic tag names.
    pub tags: Vec<String>,
    /// Publish time in epoch milliseconds.
    pub published_at: Option<i64>,
    /// Coarse poster location.
    pub ip_location: Option<String>,
    /// Token the note was fetched with.
    pub xsec_token: String,
}

impl NoteDetail {
    /// Decodes a `note_card`; `None` when it carries no id.
    #[must_use]
    pub fn decode(card: &Value, xsec_token: &str) -> Option<Self> {
        let note_id = non_empty(first_string(card, &["note_id", "id"]))?;
        let interact = card.get("interact_info");

        let images = card
            .get("image_list")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|image| non_empty(first_string(image, &["url_default", "url"])))
                    .collect()
            })
            .unwrap_or_default();

        let video_url = card
            .pointer("/video/media/stream/h264/0/master_url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        let tags = card
            .get("tag_list")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|tag| non_empty(first_string(tag, &["name"])))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            note_id,
            note_type: first_string(card, &["type"]),
            title: first_string(card, &["title", "display_title"]),
            description: first_string(card, &["desc"]),
            author: UserRef::decode(card.get("user")),
            liked_count: display_count(interact, "liked_count"),
            collected_count: display_count(interact, "collected_count"),
            comment_count: display_count(interact, "comment_count"),
            share_count: display_count(interact, "share_count"),
            images,
            video_url,
            tags,
            published_at: card.get("time").and_then(Value::as_i64),
            ip_location: non_empty(first_string(card, &["ip_location"])),
            xsec_token: xsec_token.to_string(),
        })
    }
}

/// Comment with optionally expanded replies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommentNode {
    /// Comment id.
    pub id: String,
    /// Text.
    pub content: String,
    /// Author (`user_info` → `user`).
    pub author: UserRef,
    /// Likes.
    pub like_count: u64,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
    /// Reply count reported by the server.
    pub sub_comment_count: u64,
    /// Coarse commenter location.
    pub ip_location: Option<String>,
    /// Expanded replies; always present, possibly empty, capped.
    pub sub_comments: Vec<CommentNode>,
}

impl CommentNode {
    /// Decodes a comment; `None` when it carries no id.
    ///
    /// Inline replies are not decoded here; replies are attached by the
    /// expansion step.
    #[must_use]
    pub fn decode(value: &Value) -> Option<Self> {
        let id = non_empty(first_string(value, &["id", "comment_id"]))?;
        Some(Self {
            id,
            content: first_string(value, &["content"]),
            author: UserRef::decode(value.get("user_info").or_else(|| value.get("user"))),
            like_count: value.get("like_count").map_or(0, parse_count),
            created_at: value
                .get("create_time")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
            sub_comment_count: value.get("sub_comment_count").map_or(0, parse_count),
            ip_location: non_empty(first_string(value, &["ip_location"])),
            sub_comments: Vec::new(),
        })
    }
}

/// Public profile of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    /// User id (as requested).
    pub user_id: String,
    /// Display name.
    pub nickname: String,
    /// Platform handle.
    pub red_id: String,
    /// Bio.
    pub description: String,
    /// Avatar (`imageb` → `images`).
    pub avatar: String,
    /// Gender code (0 male, 1 female) when disclosed.
    pub gender: Option<i64>,
    /// Coarse location.
    pub ip_location: Option<String>,
    /// Display following count.
    pub follows: String,
    /// Display follower count.
    pub fans: String,
    /// Display likes-and-collects count.
    pub interaction: String,
}

impl UserProfile {
    /// Decodes `{basic_info, interactions: [{type, count}]}`.
    #[must_use]
    pub fn decode(user_id: &str, payload: &Value) -> Self {
        let basic = payload.get("basic_info").unwrap_or(&Value::Null);
        let interaction_count = |kind: &str| {
            payload
                .get("interactions")
                .and_then(Value::as_array)
                .and_then(|list| {
                    list.iter()
                        .find(|entry| entry.get("type").and_then(Value::as_str) == Some(kind))
                })
                .and_then(|entry| entry.get("count"))
                .map(scalar_string)
                .and_then(non_empty)
                .unwrap_or_else(|| ZERO_COUNT.to_string())
        };

        Self {
            user_id: user_id.to_string(),
            nickname: first_string(basic, &["nickname"]),
            red_id: first_string(basic, &["red_id"]),
            description: first_string(basic, &["desc"]),
            avatar: first_string(basic, &["imageb", "images"]),
            gender: basic.get("gender").and_then(Value::as_i64),
            ip_location: non_empty(first_string(basic, &["ip_location"])),
            follows: interaction_count("follows"),
            fans: interaction_count("fans"),
            interaction: interaction_count("interaction"),
        }
    }
}

/// Parses a count that may be a number, a digit string, or carry a
/// `万`/`w` (×10 000) suffix or a trailing `+`. Unparseable input yields 0.
#[must_use]
pub fn parse_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(float_to_count))
            .unwrap_or(0),
        Value::String(s) => parse_count_str(s),
        _ => 0,
    }
}

fn parse_count_str(raw: &str) -> u64 {
    let trimmed = raw.trim().trim_end_matches('+');
    let (number, multiplier) = match trimmed
        .strip_suffix('万')
        .or_else(|| trimmed.strip_suffix('w'))
        .or_else(|| trimmed.strip_suffix('W'))
    {
        Some(rest) => (rest.trim(), 10_000.0),
        None => (trimmed, 1.0),
    };
    if let Ok(whole) = number.parse::<u64>() {
        return if multiplier > 1.0 {
            whole.saturating_mul(10_000)
        } else {
            whole
        };
    }
    number
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map_or(0, |f| float_to_count(f * multiplier))
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn float_to_count(value: f64) -> u64 {
    if value >= u64::MAX as f64 {
        u64::MAX
    } else {
        value.round() as u64
    }
}

/// First non-empty string (or number rendered as string) among `keys`.
fn first_string(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .map(scalar_string)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Strings verbatim, numbers and booleans as text, everything else empty.
fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn display_count(container: Option<&Value>, key: &str) -> String {
    container
        .and_then(|c| c.get(key))
        .map(scalar_string)
        .and_then(non_empty)
        .unwrap_or_else(|| ZERO_COUNT.to_string())
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    // ==================== Count Parsing ====================

    #[test]
    fn test_parse_count_variants() {
        assert_eq!(parse_count(&json!(42)), 42);
        assert_eq!(parse_count(&json!("42")), 42);
        assert_eq!(parse_count(&json!("1.2万")), 12_000);
        assert_eq!(parse_count(&json!("3w")), 30_000);
        assert_eq!(parse_count(&json!("10+")), 10);
        assert_eq!(parse_count(&json!("")), 0);
        assert_eq!(parse_count(&json!(null)), 0);
        assert_eq!(parse_count(&json!("abc")), 0);
    }

    // ==================== Page Decoding ====================

    #[test]
    fn test_page_decode_numeric_cursor_and_defaults() {
        let page = Page::decode(
            &json!({"comments": [{"id": "c1"}, {"content": "no id"}], "cursor": 123, "has_more": true}),
            "comments",
            CommentNode::decode,
        );
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.cursor, "123");
        assert!(page.has_more);

        let empty: Page<CommentNode> = Page::decode(&json!({}), "comments", CommentNode::decode);
        assert_eq!(empty, Page::empty());
    }

    // ==================== Record Decoding ====================

    #[test]
    fn test_note_summary_from_search_item() {
        let item = json!({
            "id": "n1",
            "model_type": "note",
            "xsec_token": "tok",
            "note_card": {
                "display_title": "Coffee",
                "type": "normal",
                "user": {"user_id": "u1", "nick_name": "Ann", "avatar": "http://a"},
                "interact_info": {"liked_count": "1.1万"},
                "cover": {"url": "http://cover"}
            }
        });
        let summary = NoteSummary::decode(&item).unwrap();
        assert_eq!(summary.note_id, "n1");
        assert_eq!(summary.xsec_token, "tok");
        assert_eq!(summary.title, "Coffee");
        assert_eq!(summary.cover_url, "http://cover");
        assert_eq!(summary.author.nickname, "Ann");
        assert_eq!(summary.author.avatar, "http://a");
        assert_eq!(summary.liked_count, "1.1万");
    }

    #[test]
    fn test_note_summary_skips_query_suggestions() {
        assert!(NoteSummary::decode(&json!({"id": "q", "model_type": "rec_query"})).is_none());
    }

    #[test]
    fn test_note_summary_from_user_listing() {
        let note = json!({"note_id": "n2", "display_title": "T", "xsec_token": "x"});
        let summary = NoteSummary::decode(&note).unwrap();
        assert_eq!(summary.note_id, "n2");
        assert_eq!(summary.liked_count, "0");
    }

    #[test]
    fn test_note_detail_fallbacks() {
        let card = json!({
            "note_id": "n3",
            "type": "video",
            "display_title": "Fallback title",
            "desc": "body",
            "user": {"user_id": "u", "nickname": "N", "image": "http://img"},
            "interact_info": {"liked_count": "5", "comment_count": 7},
            "image_list": [{"url_default": "http://d"}, {"url": "http://u"}, {}],
            "video": {"media": {"stream": {"h264": [{"master_url": "http://v"}]}}},
            "tag_list": [{"name": "food"}],
            "time": 1_700_000_000_000_i64,
            "ip_location": "Shanghai"
        });
        let detail = NoteDetail::decode(&card, "tok").unwrap();
        assert_eq!(detail.title, "Fallback title");
        assert_eq!(detail.images, vec!["http://d", "http://u"]);
        assert_eq!(detail.video_url.as_deref(), Some("http://v"));
        assert_eq!(detail.comment_count, "7");
        assert_eq!(detail.collected_count, "0");
        assert_eq!(detail.tags, vec!["food"]);
        assert_eq!(detail.published_at, Some(1_700_000_000_000));
        assert_eq!(detail.xsec_token, "tok");
    }

    #[test]
    fn test_comment_node_always_serializes_sub_comments() {
        let node = CommentNode::decode(&json!({
            "id": "c1",
            "content": "hi",
            "user_info": {"user_id": "u", "nickname": "N", "image": "http://i"},
            "like_count": "3",
            "create_time": 1_700_000_000_000_i64,
            "sub_comment_count": "0"
        }))
        .unwrap();
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["sub_comments"], json!([]));
        assert_eq!(json["like_count"], 3);
        assert_eq!(node.author.avatar, "http://i");
    }

    #[test]
    fn test_user_profile_decode() {
        let payload = json!({
            "basic_info": {"nickname": "Ann", "red_id": "123", "desc": "bio", "images": "http://a", "gender": 1},
            "interactions": [
                {"type": "follows", "count": "10"},
                {"type": "fans", "count": "2万"},
                {"type": "interaction", "count": 99}
            ]
        });
        let profile = UserProfile::decode("u1", &payload);
        assert_eq!(profile.nickname, "Ann");
        assert_eq!(profile.avatar, "http://a");
        assert_eq!(profile.fans, "2万");
        assert_eq!(profile.interaction, "99");
        assert_eq!(profile.gender, Some(1));
    }

    #[test]
    fn test_user_profile_missing_sections() {
        let profile = UserProfile::decode("u1", &json!({}));
        assert_eq!(profile.user_id, "u1");
        assert_eq!(profile.follows, "0");
    }
}
