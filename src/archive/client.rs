//! Shared HTTP client with bounded retries.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use super::{FetchError, Result};

/// Maximum backoff delay between retries (seconds).
const MAX_BACKOFF_SECS: u64 = 60;

/// Base delay for exponential backoff (milliseconds).
const BACKOFF_BASE_MS: u64 = 1000;

/// Keep-alive HTTP client shared by every fetch in a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    request_delay: Duration,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        request_delay: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            request_delay,
            max_retries,
        })
    }

    /// GET a URL, retrying transient failures with capped exponential
    /// backoff. Non-success statuses count as failures and are retried.
    pub async fn get(&self, url: &Url) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            if !self.request_delay.is_zero() {
                sleep(self.request_delay).await;
            }

            match self.try_get(url).await {
                Ok(body) => return Ok(body),
                Err(err) if attempt < self.max_retries => {
                    let backoff = backoff_delay(attempt, BACKOFF_BASE_MS);
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        error = %err,
                        "request failed, retrying in {:?}",
                        backoff
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_get(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        debug!(url = %url, bytes = body.len(), "fetched");
        Ok(body.to_vec())
    }
}

/// Calculate exponential backoff delay for a given attempt.
fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_SECS * 1000))
}
