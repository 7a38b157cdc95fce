//! User profile and posted-notes endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;

use super::model::{NoteSummary, Page};
use super::paginate::PageSource;
use crate::client::{ApiError, RequestPipeline};
use crate::input::UserLocator;

/// Profile endpoint.
pub const USER_PROFILE_URI: &str = "/api/sns/web/v1/user/otherinfo";

/// Posted-notes listing.
pub const USER_POSTED_URI: &str = "/api/sns/web/v1/user_posted";

/// Page size the web client requests for posted notes.
pub const USER_POSTED_PAGE_SIZE: u32 = 30;

const USER_IMAGE_FORMATS: &str = "jpg,webp,avif";

/// Notes posted by one user.
#[derive(Debug, Clone)]
pub struct UserNotesSource {
    pipeline: Arc<RequestPipeline>,
    user: UserLocator,
}

impl UserNotesSource {
    /// Notes posted by `user`, with its security token if the locator has one.
    #[must_use]
    pub fn new(pipeline: Arc<RequestPipeline>, user: UserLocator) -> Self {
        Self { pipeline, user }
    }
}

#[async_trait]
impl PageSource for UserNotesSource {
    type Item = NoteSummary;

    #[instrument(level = "debug", skip(self), fields(user_id = %self.user.user_id))]
    async fn fetch_page(&self, cursor: &str) -> Result<Page<NoteSummary>, ApiError> {
        let params = json!({
            "num": USER_POSTED_PAGE_SIZE,
            "cursor": cursor,
            "user_id": self.user.user_id,
            "image_formats": USER_IMAGE_FORMATS,
            "xsec_token": self.user.xsec_token,
            "xsec_source": self.user.xsec_source,
        });
        let data = self.pipeline.get(USER_POSTED_URI, &params).await?;
        Ok(Page::decode(&data, "notes", NoteSummary::decode))
    }
}
