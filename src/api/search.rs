//! Keyword search requests and their page source.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::model::{NoteSummary, Page};
use super::paginate::PageSource;
use crate::client::{ApiError, RequestPipeline};
use crate::sign::search_id;

/// Search endpoint path.
pub const SEARCH_NOTES_URI: &str = "/api/sns/web/v1/search/notes";

/// Default results per search page.
pub const DEFAULT_SEARCH_PAGE_SIZE: u32 = 20;

/// Result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSort {
    /// Platform relevance.
    #[default]
    General,
    /// Most liked first.
    Popularity,
    /// Newest first.
    Latest,
}

impl SearchSort {
    /// Wire value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Popularity => "popularity_descending",
            Self::Latest => "time_descending",
        }
    }
}

/// Note type filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchNoteType {
    /// Every note.
    #[default]
    All,
    /// Video notes only.
    Video,
    /// Image notes only.
    Image,
}

impl SearchNoteType {
    /// Wire value.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::All => 0,
            Self::Video => 1,
            Self::Image => 2,
        }
    }
}

/// Parameters of a keyword search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search keyword.
    pub keyword: String,
    /// 1-based page number.
    pub page: u32,
    /// Results per page.
    pub page_size: u32,
    /// Ordering.
    pub sort: SearchSort,
    /// Type filter.
    pub note_type: SearchNoteType,
}

impl SearchRequest {
    /// First page of `keyword` with default options.
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            page: 1,
            page_size: DEFAULT_SEARCH_PAGE_SIZE,
            sort: SearchSort::default(),
            note_type: SearchNoteType::default(),
        }
    }

    /// Request body for `page`, in the key order the platform signs.
    #[must_use]
    pub fn payload(&self, page: u32, search_id: &str) -> Value {
        json!({
            "keyword": self.keyword,
            "page": page,
            "page_size": self.page_size,
            "search_id": search_id,
            "sort": self.sort.as_str(),
            "note_type": self.note_type.code(),
        })
    }
}

/// Search as a [`PageSource`]; the cursor is the page number.
///
/// One search id is kept for every page of the same listing.
#[derive(Debug, Clone)]
pub struct SearchSource {
    pipeline: Arc<RequestPipeline>,
    request: SearchRequest,
    search_id: String,
}

impl SearchSource {
    /// Creates a source with a fresh search id.
    #[must_use]
    pub fn new(pipeline: Arc<RequestPipeline>, request: SearchRequest) -> Self {
        Self {
            pipeline,
            request,
            search_id: search_id(),
        }
    }

    /// Page number a cursor refers to; `""` means the request's own page.
    fn page_for(&self, cursor: &str) -> u32 {
        cursor.parse().unwrap_or(self.request.page).max(1)
    }
}

#[async_trait]
impl PageSource for SearchSource {
    type Item = NoteSummary;

    #[instrument(level = "debug", skip(self), fields(keyword = %self.request.keyword))]
    async fn fetch_page(&self, cursor: &str) -> Result<Page<NoteSummary>, ApiError> {
        let page = self.page_for(cursor);
        let payload = self.request.payload(page, &self.search_id);
        let data = self.pipeline.post(SEARCH_NOTES_URI, &payload).await?;

        let mut decoded = Page::decode(&data, "items", NoteSummary::decode);
        decoded.cursor = (page + 1).to_string();
        Ok(decoded)
    }
}
