//! Comment listing and bounded reply expansion.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde_json::json;
use tracing::{debug, instrument};

use super::model::{CommentNode, Page};
use super::paginate::{PageSource, Paginator};
use crate::client::constants::MAX_REPLY_PAGE_SIZE;
use crate::client::{ApiError, RequestPipeline};

/// Top-level comment listing.
pub const COMMENT_PAGE_URI: &str = "/api/sns/web/v2/comment/page";

/// Reply listing under one root comment.
pub const SUB_COMMENT_PAGE_URI: &str = "/api/sns/web/v2/comment/sub/page";

const COMMENT_IMAGE_FORMATS: &str = "jpg,webp,avif";

/// Top-level comments of one note.
#[derive(Debug, Clone)]
pub struct CommentSource {
    pipeline: Arc<RequestPipeline>,
    note_id: String,
    xsec_token: String,
}

impl CommentSource {
    /// Top-level comments of `note_id`, viewed with `xsec_token`.
    #[must_use]
    pub fn new(
        pipeline: Arc<RequestPipeline>,
        note_id: impl Into<String>,
        xsec_token: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            note_id: note_id.into(),
            xsec_token: xsec_token.into(),
        }
    }
}

#[async_trait]
impl PageSource for CommentSource {
    type Item = CommentNode;

    #[instrument(level = "debug", skip(self), fields(note_id = %self.note_id))]
    async fn fetch_page(&self, cursor: &str) -> Result<Page<CommentNode>, ApiError> {
        let params = json!({
            "note_id": self.note_id,
            "cursor": cursor,
            "top_comment_id": "",
            "image_formats": COMMENT_IMAGE_FORMATS,
            "xsec_token": self.xsec_token,
        });
        let data = self.pipeline.get(COMMENT_PAGE_URI, &params).await?;
        Ok(Page::decode(&data, "comments", CommentNode::decode))
    }
}

/// Replies under one root comment, `num` per page.
#[derive(Debug, Clone)]
pub struct ReplySource {
    pipeline: Arc<RequestPipeline>,
    note_id: String,
    root_comment_id: String,
    xsec_token: String,
    num: usize,
}

impl ReplySource {
    /// `num` is clamped to `1..=MAX_REPLY_PAGE_SIZE`.
    #[must_use]
    pub fn new(
        pipeline: Arc<RequestPipeline>,
        note_id: impl Into<String>,
        root_comment_id: impl Into<String>,
        xsec_token: impl Into<String>,
        num: usize,
    ) -> Self {
        Self {
            pipeline,
            note_id: note_id.into(),
            root_comment_id: root_comment_id.into(),
            xsec_token: xsec_token.into(),
            num: num.clamp(1, MAX_REPLY_PAGE_SIZE),
        }
    }
}

#[async_trait]
impl PageSource for ReplySource {
    type Item = CommentNode;

    #[instrument(level = "debug", skip(self), fields(root = %self.root_comment_id))]
    async fn fetch_page(&self, cursor: &str) -> Result<Page<CommentNode>, ApiError> {
        let params = json!({
            "note_id": self.note_id,
            "root_comment_id": self.root_comment_id,
            "num": self.num,
            "cursor": cursor,
            "image_formats": COMMENT_IMAGE_FORMATS,
            "top_comment_id": "",
            "xsec_token": self.xsec_token,
        });
        let data = self.pipeline.get(SUB_COMMENT_PAGE_URI, &params).await?;
        Ok(Page::decode(&data, "comments", CommentNode::decode))
    }
}

/// Number of replies to fetch for a comment advertising `sub_comment_count`.
pub(crate) fn reply_target(sub_comment_count: u64, cap: usize) -> usize {
    usize::try_from(sub_comment_count)
        .unwrap_or(usize::MAX)
        .min(cap)
}

/// Fills `sub_comments` of every comment with at most
/// `min(sub_comment_count, cap)` replies.
///
/// At most `fan_out` reply listings run at once. Comment order is preserved;
/// comments without replies get an empty list without a request. Replies past
/// the cap are not fetched.
///
/// # Errors
///
/// The first reply listing failure aborts the expansion.
#[instrument(skip(pipeline, comments, xsec_token), fields(comments = comments.len()))]
pub async fn expand_replies(
    pipeline: &Arc<RequestPipeline>,
    note_id: &str,
    xsec_token: &str,
    comments: Vec<CommentNode>,
    cap: usize,
    fan_out: usize,
) -> Result<Vec<CommentNode>, ApiError> {
    stream::iter(comments)
        .map(|mut comment| async move {
            let wanted = reply_target(comment.sub_comment_count, cap);
            if wanted == 0 {
                comment.sub_comments = Vec::new();
                return Ok(comment);
            }
            let source = ReplySource::new(
                Arc::clone(pipeline),
                note_id,
                comment.id.clone(),
                xsec_token,
                wanted,
            );
            comment.sub_comments = Paginator::new(source).collect_all(Some(wanted)).await?;
            debug!(
                comment_id = %comment.id,
                advertised = comment.sub_comment_count,
                fetched = comment.sub_comments.len(),
                "replies expanded"
            );
            Ok(comment)
        })
        .buffered(fan_out.max(1))
        .try_collect()
        .await
}
