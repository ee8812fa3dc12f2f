//! Fetcher (§2, §6): stateless capability that fetches one URL and,
//! optionally, extracts same-domain links. Only its contract is specified;
//! the concrete implementation in `http` is an external collaborator the
//! rest of the engine depends on only through the `Fetcher` trait.

pub mod http;
pub mod sitemap;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkContext {
    Header,
    Footer,
    Body,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub url: String,
    pub context: LinkContext,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-task context deadline (≈30s, §4.3 step 3).
    pub timeout: Duration,
    pub user_agent: String,
    /// Whether to parse the body for links (job's `find_links`, §4.3 step 5).
    pub extract_links: bool,
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status_code: u16,
    pub response_time: Duration,
    pub cache_status: Option<String>,
    pub content_type: Option<String>,
    pub redirect_url: Option<String>,
    pub links: Vec<Link>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Timeouts and transport-level failures are worth retrying; a
    /// malformed URL never will be (§4.2 retry policy).
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Transport(_))
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResult, FetchError>;

    /// Raw GET used by sitemap/robots.txt discovery, with no link extraction.
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<Option<String>, FetchError>;
}
