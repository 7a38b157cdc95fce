//! Signed request pipeline, error classification, and retry policy.
//!
//! # Overview
//!
//! A logical operation calls [`RequestPipeline::execute`], which:
//!
//! 1. builds fresh [`SignatureMaterial`](crate::sign::SignatureMaterial) through
//!    the serialized signing oracle,
//! 2. attaches the live session's cookies,
//! 3. picks the next proxy from the pool (if any),
//! 4. sends the request with the configured timeout,
//! 5. absorbs rotated cookies and classifies the outcome into [`ApiError`],
//! 6. retries only [`ErrorKind::Transport`] failures per [`RetryPolicy`].

mod classify;
pub mod constants;
mod error;
mod pipeline;
mod retry;

pub use classify::{classify_response, classify_transport};
pub use error::{ApiError, ErrorKind, excerpt};
pub use pipeline::{PipelineConfig, RequestPipeline};
pub use retry::{RetryDecision, RetryPolicy};
