//! Archive access: month index pages and individual messages.
//!
//! Both fetchers consult the shared [`CacheRepository`] before the network
//! and write back after it; they differ only in freshness policy. Index
//! pages for closed months and message bodies are immutable; the current
//! month's index is the one mutable resource.

mod client;
mod index;
mod message;

pub use client::HttpClient;
pub use index::IndexFetcher;
pub use message::{FetchedMessage, MessageFetcher};

use thiserror::Error;

use crate::repository::RepositoryError;

/// Errors from archive fetching.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("invalid archive url: {0}")]
    Url(#[from] url::ParseError),
    #[error("index page parse failed: {0}")]
    IndexParse(String),
    #[error(transparent)]
    Cache(#[from] RepositoryError),
}

pub type Result<T> = std::result::Result<T, FetchError>;
