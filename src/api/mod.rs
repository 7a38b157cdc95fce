//! Logical operations over the signed pipeline.
//!
//! [`XhsClient`] is the surface the CLI (or any other front end) calls:
//! keyword search, note detail, comments with reply expansion, user profile
//! and notes, and batch fetches that report per-item outcomes instead of
//! aborting.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xhs_core::api::{ClientOptions, SearchRequest, XhsClient};
//! use xhs_core::client::{PipelineConfig, RequestPipeline};
//! use xhs_core::session::Session;
//! use xhs_core::sign::{ExclusiveOracle, HttpSigningOracle, SignatureEnvelopeBuilder};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let oracle = HttpSigningOracle::new("http://127.0.0.1:5005", std::time::Duration::from_secs(30))?;
//! let signer = SignatureEnvelopeBuilder::new(Arc::new(ExclusiveOracle::new(Arc::new(oracle))));
//! let session = Arc::new(Session::default());
//! let pipeline = RequestPipeline::new(PipelineConfig::default(), signer, session)?;
//! let client = XhsClient::new(Arc::new(pipeline), ClientOptions::default())?;
//!
//! let page = client.search_notes(&SearchRequest::new("咖啡")).await?;
//! println!("{} notes", page.items.len());
//! # Ok(())
//! # }
//! ```

mod batch;
mod comments;
mod model;
mod paginate;
mod search;
mod user;

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

pub use batch::{
    BatchEntry, BatchOutcome, BatchReport, INVALID_INPUT_KIND, NOT_FOUND_KIND, UrlBatchReport,
};
pub use comments::{
    COMMENT_PAGE_URI, CommentSource, ReplySource, SUB_COMMENT_PAGE_URI, expand_replies,
};
pub use model::{
    CommentNode, NoteDetail, NoteSummary, Page, UserProfile, UserRef, parse_count,
};
pub use paginate::{PageSource, Paginator};
pub use search::{
    DEFAULT_SEARCH_PAGE_SIZE, SEARCH_NOTES_URI, SearchNoteType, SearchRequest, SearchSort,
    SearchSource,
};
pub use user::{USER_POSTED_PAGE_SIZE, USER_POSTED_URI, USER_PROFILE_URI, UserNotesSource};

use crate::client::constants::{DEFAULT_REPLY_CAP, DEFAULT_REPLY_FAN_OUT};
use crate::client::{ApiError, RequestPipeline};
use crate::input::{
    InputError, NoteLocator, NoteRef, UserLocator, parse_batch, parse_note_ref, parse_note_url,
};
use crate::user_agent::BROWSER_USER_AGENT;

/// Note detail endpoint.
pub const NOTE_FEED_URI: &str = "/api/sns/web/v1/feed";

/// Source sent with note detail requests that carry none.
pub const DEFAULT_XSEC_SOURCE: &str = "pc_search";

/// Maximum redirects followed when resolving a short link.
const MAX_SHORT_LINK_REDIRECTS: usize = 10;

/// Behavior knobs of the logical operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Replies fetched per top-level comment at most.
    pub reply_cap: usize,
    /// Reply listings run concurrently at most.
    pub reply_fan_out: usize,
    /// `xsec_source` used when a locator has none.
    pub default_xsec_source: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            reply_cap: DEFAULT_REPLY_CAP,
            reply_fan_out: DEFAULT_REPLY_FAN_OUT,
            default_xsec_source: DEFAULT_XSEC_SOURCE.to_string(),
        }
    }
}

/// Failure resolving user input to a platform resource.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The input is not a recognizable id or URL.
    #[error(transparent)]
    Input(#[from] InputError),
    /// The platform request failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl LookupError {
    fn to_outcome<T>(&self) -> BatchOutcome<T> {
        match self {
            Self::Input(error) => BatchOutcome::from_input_error(error),
            Self::Api(error) => BatchOutcome::from_api_error(error),
        }
    }
}

/// Platform client exposing the logical operations.
#[derive(Debug, Clone)]
pub struct XhsClient {
    pipeline: Arc<RequestPipeline>,
    options: ClientOptions,
    redirects: reqwest::Client,
}

impl XhsClient {
    /// Wraps `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns an error if the unsigned client used for short links cannot be built.
    pub fn new(pipeline: Arc<RequestPipeline>, options: ClientOptions) -> Result<Self, reqwest::Error> {
        let redirects = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_SHORT_LINK_REDIRECTS))
            .user_agent(BROWSER_USER_AGENT)
            .timeout(pipeline.config().timeout)
            .build()?;
        Ok(Self {
            pipeline,
            options,
            redirects,
        })
    }

    /// The underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    /// Active options.
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    // ---- search ----

    /// One page of keyword search results (`request.page`).
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    #[instrument(skip(self, request), fields(keyword = %request.keyword, page = request.page))]
    pub async fn search_notes(&self, request: &SearchRequest) -> Result<Page<NoteSummary>, ApiError> {
        let source = SearchSource::new(Arc::clone(&self.pipeline), request.clone());
        let page = source.fetch_page(&request.page.to_string()).await?;
        info!(notes = page.items.len(), has_more = page.has_more, "search page fetched");
        Ok(page)
    }

    /// Search listing across pages, starting at `request.page`.
    #[must_use]
    pub fn search_paginator(&self, request: SearchRequest) -> Paginator<SearchSource> {
        Paginator::new(SearchSource::new(Arc::clone(&self.pipeline), request))
    }

    // ---- notes ----

    /// Full note for `locator`; `Ok(None)` when the platform returns no item.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    #[instrument(skip(self, locator), fields(note_id = %locator.note_id))]
    pub async fn note_detail(&self, locator: &NoteLocator) -> Result<Option<NoteDetail>, ApiError> {
        let xsec_source = if locator.xsec_source.is_empty() {
            self.options.default_xsec_source.as_str()
        } else {
            locator.xsec_source.as_str()
        };
        let body = json!({
            "source_note_id": locator.note_id,
            "image_formats": ["jpg", "webp", "avif"],
            "extra": {"need_body_topic": 1},
            "xsec_source": xsec_source,
            "xsec_token": locator.xsec_token,
        });
        let data = self.pipeline.post(NOTE_FEED_URI, &body).await?;

        let detail = data
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("note_card"))
            .and_then(|card| NoteDetail::decode(card, &locator.xsec_token));
        if detail.is_none() {
            info!("note not found");
        }
        Ok(detail)
    }

    /// Turns a parsed reference into a locator, following short links.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Api`] when the short link cannot be fetched and
    /// [`LookupError::Input`] when it does not lead to a note URL.
    pub async fn resolve_note_ref(&self, note: &NoteRef) -> Result<NoteLocator, LookupError> {
        match note {
            NoteRef::ShortLink(link) => self.resolve_short_link(link).await,
            NoteRef::Id(id) => Ok(NoteLocator::bare(id.clone())),
            NoteRef::Url(locator) => Ok(locator.clone()),
        }
    }

    #[instrument(skip(self))]
    async fn resolve_short_link(&self, link: &str) -> Result<NoteLocator, LookupError> {
        let response = self
            .redirects
            .get(link)
            .send()
            .await
            .map_err(|error| ApiError::transport(link, error))?;
        let resolved = response.url().to_string();
        debug!(resolved = %resolved, "short link followed");
        Ok(parse_note_url(&resolved)?)
    }

    /// Note detail from a bare id, note URL or short link.
    ///
    /// # Errors
    ///
    /// See [`resolve_note_ref`](Self::resolve_note_ref) and
    /// [`note_detail`](Self::note_detail).
    pub async fn note_from_input(&self, input: &str) -> Result<Option<NoteDetail>, LookupError> {
        let note = parse_note_ref(input)?;
        let locator = self.resolve_note_ref(&note).await?;
        Ok(self.note_detail(&locator).await?)
    }

    // ---- comments ----

    /// Top-level comment listing of a note.
    #[must_use]
    pub fn comments_paginator(&self, note: &NoteLocator) -> Paginator<CommentSource> {
        Paginator::new(CommentSource::new(
            Arc::clone(&self.pipeline),
            note.note_id.clone(),
            note.xsec_token.clone(),
        ))
    }

    /// Comments from `cursor` until at least `count` are gathered (whole
    /// pages), optionally with each comment's replies expanded up to the
    /// reply cap.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`]; callers should treat
    /// [`ApiError::SessionExpired`] as "re-authenticate".
    #[instrument(skip(self, note), fields(note_id = %note.note_id))]
    pub async fn comments(
        &self,
        note: &NoteLocator,
        cursor: &str,
        count: usize,
        expand: bool,
    ) -> Result<Page<CommentNode>, ApiError> {
        let mut page = self
            .comments_paginator(note)
            .collect_pages(cursor, count.max(1))
            .await?;
        if expand {
            page.items = expand_replies(
                &self.pipeline,
                &note.note_id,
                &note.xsec_token,
                page.items,
                self.options.reply_cap,
                self.options.reply_fan_out,
            )
            .await?;
        }
        info!(
            comments = page.items.len(),
            has_more = page.has_more,
            "comments fetched"
        );
        Ok(page)
    }

    /// One page of replies under `root_comment_id`.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    pub async fn sub_comments(
        &self,
        note: &NoteLocator,
        root_comment_id: &str,
        cursor: &str,
        num: usize,
    ) -> Result<Page<CommentNode>, ApiError> {
        ReplySource::new(
            Arc::clone(&self.pipeline),
            note.note_id.clone(),
            root_comment_id,
            note.xsec_token.clone(),
            num,
        )
        .fetch_page(cursor)
        .await
    }

    // ---- users ----

    /// Profile of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    #[instrument(skip(self))]
    pub async fn user_profile(&self, user_id: &str) -> Result<UserProfile, ApiError> {
        let data = self
            .pipeline
            .get(USER_PROFILE_URI, &json!({"target_user_id": user_id}))
            .await?;
        Ok(UserProfile::decode(user_id, &data))
    }

    /// One page of notes posted by `user`.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    pub async fn user_notes(
        &self,
        user: &UserLocator,
        cursor: &str,
    ) -> Result<Page<NoteSummary>, ApiError> {
        UserNotesSource::new(Arc::clone(&self.pipeline), user.clone())
            .fetch_page(cursor)
            .await
    }

    /// Posted-notes listing across pages.
    #[must_use]
    pub fn user_notes_paginator(&self, user: UserLocator) -> Paginator<UserNotesSource> {
        Paginator::new(UserNotesSource::new(Arc::clone(&self.pipeline), user))
    }

    // ---- batches ----

    /// Fetches each input (id, URL or short link) in order. Failures are
    /// recorded per entry and never stop the batch.
    #[instrument(skip(self, inputs), fields(total = inputs.len()))]
    pub async fn batch_note_details(&self, inputs: &[String]) -> BatchReport<NoteDetail> {
        let mut report = BatchReport::default();
        for input in inputs {
            let outcome = note_outcome(self.note_from_input(input).await);
            record(&mut report, input, outcome);
        }
        info!(
            fetched = report.fetched,
            failed = report.failed,
            "note batch finished"
        );
        report
    }

    /// Splits free text into note and profile references and fetches each.
    ///
    /// Unrecognized entries are reported as failed notes.
    #[instrument(skip(self, text))]
    pub async fn batch_from_text(&self, text: &str) -> UrlBatchReport {
        let parsed = parse_batch(text);
        let mut report = UrlBatchReport::default();

        for note in &parsed.notes {
            let fetched = match self.resolve_note_ref(note).await {
                Ok(locator) => self.note_detail(&locator).await.map_err(LookupError::from),
                Err(error) => Err(error),
            };
            record(&mut report.notes, &note_label(note), note_outcome(fetched));
        }
        for (input, error) in &parsed.invalid {
            record(
                &mut report.notes,
                input,
                BatchOutcome::from_input_error(error),
            );
        }
        for user in &parsed.users {
            let outcome = match self.user_profile(&user.user_id).await {
                Ok(profile) => BatchOutcome::Fetched { data: profile },
                Err(error) => BatchOutcome::from_api_error(&error),
            };
            record(&mut report.users, &user.user_id, outcome);
        }

        info!(
            total = report.total(),
            failed = report.failed(),
            "url batch finished"
        );
        report
    }
}

fn note_outcome(result: Result<Option<NoteDetail>, LookupError>) -> BatchOutcome<NoteDetail> {
    match result {
        Ok(Some(detail)) => BatchOutcome::Fetched { data: detail },
        Ok(None) => BatchOutcome::not_found("note"),
        Err(error) => error.to_outcome(),
    }
}

fn record<T>(report: &mut BatchReport<T>, input: &str, outcome: BatchOutcome<T>) {
    if let BatchOutcome::Failed { kind, error } = &outcome {
        warn!(input = %input, kind = %kind, error = %error, "batch item failed");
    }
    report.push(input, outcome);
}

fn note_label(note: &NoteRef) -> String {
    match note {
        NoteRef::Id(id) => id.clone(),
        NoteRef::Url(locator) => locator.note_id.clone(),
        NoteRef::ShortLink(link) => link.clone(),
    }
}
