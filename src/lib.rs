//! Xiaohongshu Web API Client Library
//!
//! A resilient client for a web API that demands a per-request signature,
//! session cookies, and anti-blocking measures.
//!
//! # Architecture
//!
//! - [`sign`] - Signature envelope construction around an external signing oracle
//! - [`session`] - Credential set, live session, and encrypted session cache
//! - [`proxy`] - Round-robin proxy pool with failure marking and health probe
//! - [`client`] - Signed request pipeline, error classification, retry policy
//! - [`api`] - Logical operations, pagination, reply expansion, batches
//! - [`input`] - Identifier, URL and short-link normalization

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod client;
pub mod input;
pub mod proxy;
pub mod session;
pub mod sign;
mod user_agent;

// Re-export commonly used types
pub use api::{
    BatchOutcome, BatchReport, ClientOptions, CommentNode, LookupError, NoteDetail, NoteSummary,
    Page, Paginator, SearchRequest, UserProfile, XhsClient,
};
pub use client::{ApiError, ErrorKind, PipelineConfig, RequestPipeline, RetryPolicy};
pub use proxy::ProxyPool;
pub use session::{CredentialSet, Session, SessionCache};
pub use sign::{HttpSigningOracle, SignatureEnvelopeBuilder, SigningOracle};
