//! Twitter/X API integration surface.
//!
//! Submodules provide the HTTP client wrapper, author hydration helpers, strongly
//! typed response models and the paginating search cursor. A 429 from the API
//! never escapes as an error: the cursor reports it as [`Fetch::RateLimited`]
//! and keeps its `next_token` so the caller can resume the same page.
pub mod client;
pub mod extract;
pub mod search;
pub mod types;

pub use client::TwitterApi;
pub use search::{Fetch, PageOutcome, ResultType, SearchApi, SearchCursor, SearchRequest};

use thiserror::Error;
use trendtap_http::HttpError;

#[derive(Debug, Error)]
pub enum SocialError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("invalid search request: {0}")]
    InvalidRequest(String),
}
