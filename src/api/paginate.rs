//! Generic cursor-driven pagination over any [`PageSource`].
//!
//! [`Paginator::list_all`] yields items lazily, fetching the next page only
//! when the previous one is drained. Dropping the stream between pages
//! abandons the listing; no lock or proxy state is held across pages.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, TryStreamExt};
use tracing::{debug, instrument};

use super::model::Page;
use crate::client::ApiError;

/// A listing endpoint addressed by an opaque cursor (`""` for the first page).
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Item type of each page.
    type Item: Send;

    /// Fetches the page at `cursor`.
    async fn fetch_page(&self, cursor: &str) -> Result<Page<Self::Item>, ApiError>;
}

/// Drives a [`PageSource`] until exhaustion or an item limit.
#[derive(Debug, Clone)]
pub struct Paginator<S> {
    source: S,
}

struct ListState<T> {
    cursor: String,
    buffer: VecDeque<T>,
    emitted: usize,
    exhausted: bool,
}

impl<S: PageSource> Paginator<S> {
    /// Wraps `source`.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// The wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetches a single page.
    ///
    /// # Errors
    ///
    /// Propagates the source's [`ApiError`].
    pub async fn list_page(&self, cursor: &str) -> Result<Page<S::Item>, ApiError> {
        self.source.fetch_page(cursor).await
    }

    /// Lazily yields every item from the first page on, stopping after
    /// `max_items` (if given), on `has_more = false`, on an empty page, or
    /// when the server fails to advance the cursor.
    ///
    /// The first error is yielded and ends the stream. Re-invoking starts
    /// over from the first page.
    pub fn list_all(
        &self,
        max_items: Option<usize>,
    ) -> impl Stream<Item = Result<S::Item, ApiError>> + Send + '_ {
        self.list_from(String::new(), max_items)
    }

    /// Like [`list_all`](Self::list_all) but starting at `cursor`.
    pub fn list_from(
        &self,
        cursor: String,
        max_items: Option<usize>,
    ) -> impl Stream<Item = Result<S::Item, ApiError>> + Send + '_ {
        let state = ListState {
            cursor,
            buffer: VecDeque::new(),
            emitted: 0,
            exhausted: false,
        };

        stream::unfold(state, move |mut state| async move {
            if max_items.is_some_and(|max| state.emitted >= max) {
                return None;
            }
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    state.emitted += 1;
                    return Some((Ok(item), state));
                }
                if state.exhausted {
                    return None;
                }
                match self.source.fetch_page(&state.cursor).await {
                    Ok(page) => {
                        state.exhausted = is_last_page(&page, &state.cursor);
                        debug!(
                            items = page.items.len(),
                            has_more = page.has_more,
                            exhausted = state.exhausted,
                            "page fetched"
                        );
                        state.cursor = page.cursor;
                        state.buffer.extend(page.items);
                    }
                    Err(error) => {
                        state.exhausted = true;
                        state.buffer.clear();
                        return Some((Err(error), state));
                    }
                }
            }
        })
    }

    /// Collects [`list_all`](Self::list_all) into a vector.
    ///
    /// # Errors
    ///
    /// Returns the first [`ApiError`] encountered.
    #[instrument(level = "debug", skip(self))]
    pub async fn collect_all(&self, max_items: Option<usize>) -> Result<Vec<S::Item>, ApiError> {
        self.list_all(max_items).try_collect().await
    }

    /// Fetches whole pages from `cursor` until at least `min_items` items are
    /// gathered or the listing ends.
    ///
    /// Pages are never split, so the returned cursor continues exactly where
    /// the returned items end.
    ///
    /// # Errors
    ///
    /// Returns the first [`ApiError`] encountered.
    pub async fn collect_pages(
        &self,
        cursor: &str,
        min_items: usize,
    ) -> Result<Page<S::Item>, ApiError> {
        let mut collected = Page {
            items: Vec::new(),
            cursor: cursor.to_string(),
            has_more: true,
        };
        loop {
            let page = self.source.fetch_page(&collected.cursor).await?;
            let last = is_last_page(&page, &collected.cursor);
            collected.items.extend(page.items);
            collected.cursor = page.cursor;
            collected.has_more = !last;
            if last || collected.items.len() >= min_items {
                return Ok(collected);
            }
        }
    }
}

/// True when no further page should be requested after `page`, fetched at `cursor`.
fn is_last_page<T>(page: &Page<T>, cursor: &str) -> bool {
    !page.has_more || page.items.is_empty() || page.cursor.is_empty() || page.cursor == cursor
}
