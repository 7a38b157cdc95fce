//! Per-item outcome reports for batch fetches.
//!
//! A batch never aborts on one item's failure; every input gets an entry and
//! `fetched + failed == total` always holds.

use serde::Serialize;

use super::model::{NoteDetail, UserProfile};
use crate::client::{ApiError, ErrorKind};
use crate::input::InputError;

/// Failure kind recorded for inputs that could not be normalized.
pub const INVALID_INPUT_KIND: &str = "invalid_input";

/// Failure kind recorded when the platform has no such item.
pub const NOT_FOUND_KIND: &str = "not_found";

/// Outcome of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome<T> {
    /// Item fetched.
    Fetched {
        /// Decoded record.
        data: T,
    },
    /// Item failed; `kind` is a stable snake_case tag.
    Failed {
        /// Error kind, e.g. `session_expired` or `not_found`.
        kind: String,
        /// Human-readable message.
        error: String,
    },
}

impl<T> BatchOutcome<T> {
    pub(crate) fn from_api_error(error: &ApiError) -> Self {
        Self::Failed {
            kind: error.kind().as_str().to_string(),
            error: error.to_string(),
        }
    }

    pub(crate) fn from_input_error(error: &InputError) -> Self {
        Self::Failed {
            kind: INVALID_INPUT_KIND.to_string(),
            error: error.to_string(),
        }
    }

    pub(crate) fn not_found(what: &str) -> Self {
        Self::Failed {
            kind: NOT_FOUND_KIND.to_string(),
            error: format!("{what} not found"),
        }
    }

    /// True for [`BatchOutcome::Fetched`].
    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched { .. })
    }

    /// True when the item failed because the session must be renewed.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Failed { kind, .. } => [ErrorKind::SessionExpired, ErrorKind::CaptchaRequired]
                .iter()
                .any(|reauth| reauth.as_str() == kind),
            Self::Fetched { .. } => false,
        }
    }
}

/// One input and what happened to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry<T> {
    /// The input as given.
    pub input: String,
    /// Fetch outcome.
    #[serde(flatten)]
    pub outcome: BatchOutcome<T>,
}

/// Entries in input order with summary counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport<T> {
    /// Number of entries.
    pub total: usize,
    /// Entries fetched.
    pub fetched: usize,
    /// Entries failed.
    pub failed: usize,
    /// Per-input outcomes.
    pub entries: Vec<BatchEntry<T>>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            total: 0,
            fetched: 0,
            failed: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    /// Records one entry and updates the counts.
    pub fn push(&mut self, input: impl Into<String>, outcome: BatchOutcome<T>) {
        if outcome.is_fetched() {
            self.fetched += 1;
        } else {
            self.failed += 1;
        }
        self.total += 1;
        self.entries.push(BatchEntry {
            input: input.into(),
            outcome,
        });
    }

    /// Failed entries that need a renewed session.
    #[must_use]
    pub fn reauth_failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome.needs_reauth())
            .count()
    }
}

/// Result of a mixed note/user batch parsed from free text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UrlBatchReport {
    /// Note entries, including unrecognized inputs as failures.
    pub notes: BatchReport<NoteDetail>,
    /// Profile entries.
    pub users: BatchReport<UserProfile>,
}

impl UrlBatchReport {
    /// Entries across both reports.
    #[must_use]
    pub fn total(&self) -> usize {
        self.notes.total + self.users.total
    }

    /// Failures across both reports.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.notes.failed + self.users.failed
    }

    /// Failures across both reports that need a renewed session.
    #[must_use]
    pub fn reauth_failures(&self) -> usize {
        self.notes.reauth_failures() + self.users.reauth_failures()
    }
}
