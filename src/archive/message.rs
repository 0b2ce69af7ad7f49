//! Individual message fetching.

use std::sync::Arc;

use chrono::Utc;
use tracing::trace;

use super::{HttpClient, Result};
use crate::models::MessageLocation;
use crate::repository::CacheRepository;

/// Raw message text plus where it came from, for run statistics.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub text: String,
    pub from_cache: bool,
}

/// Resolves a message location into raw message text.
///
/// A message, once posted to the archive, never changes, so any cached entry
/// is trusted forever. This is the dominant cache-hit path on repeat runs.
#[derive(Clone)]
pub struct MessageFetcher {
    client: Arc<HttpClient>,
    cache: Arc<CacheRepository>,
}

impl MessageFetcher {
    pub fn new(client: Arc<HttpClient>, cache: Arc<CacheRepository>) -> Self {
        Self { client, cache }
    }

    pub async fn fetch(&self, location: &MessageLocation) -> Result<FetchedMessage> {
        if let Some(entry) = self.cache.get(&location.url)? {
            trace!(url = %location.url, "message served from cache");
            return Ok(FetchedMessage {
                text: String::from_utf8_lossy(&entry.content).into_owned(),
                from_cache: true,
            });
        }

        let body = self.client.get(&location.url).await?;
        self.cache.put(&location.url, &body, Utc::now())?;
        Ok(FetchedMessage {
            text: String::from_utf8_lossy(&body).into_owned(),
            from_cache: false,
        })
    }
}
