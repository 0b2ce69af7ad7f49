//! Month index fetching and link harvesting.

use std::sync::Arc;

use chrono::Utc;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::{FetchError, HttpClient, Result};
use crate::models::{ArchiveMonth, MessageLocation};
use crate::repository::CacheRepository;

/// Resolves a month into the messages listed on its archive index page(s).
///
/// Freshness policy: an index page for a closed month cannot change, so a
/// cached copy is trusted indefinitely and never re-fetched. The current
/// month's index is always re-fetched; its cached copy is only a fallback
/// when the network fails.
#[derive(Clone)]
pub struct IndexFetcher {
    client: Arc<HttpClient>,
    cache: Arc<CacheRepository>,
    base_url: Url,
}

impl IndexFetcher {
    pub fn new(client: Arc<HttpClient>, cache: Arc<CacheRepository>, base_url: Url) -> Self {
        Self {
            client,
            cache,
            base_url,
        }
    }

    /// Fetch the ordered message locations for one month, following
    /// "next page" links until the index is exhausted.
    ///
    /// `today` is the run-wide current month, captured once so the boundary
    /// month is treated consistently across the whole run.
    pub async fn fetch(
        &self,
        month: ArchiveMonth,
        today: ArchiveMonth,
    ) -> Result<Vec<MessageLocation>> {
        let closed = month.is_closed(today);
        let mut locations = Vec::new();
        let mut next = Some(self.month_url(month)?);

        while let Some(page_url) = next.take() {
            let html = self.fetch_page(&page_url, closed).await?;
            let page = parse_index_page(&page_url, &html)?;
            debug!(
                month = %month,
                page = %page_url,
                messages = page.message_urls.len(),
                "parsed index page"
            );
            locations.extend(
                page.message_urls
                    .into_iter()
                    .map(|url| MessageLocation { month, url }),
            );
            next = page.next_page;
        }

        Ok(locations)
    }

    /// The first index page for a month: `{base}/{year}/{month}/maillist.html`.
    fn month_url(&self, month: ArchiveMonth) -> Result<Url> {
        Ok(self
            .base_url
            .join(&format!("{}/{:02}/maillist.html", month.year, month.month))?)
    }

    async fn fetch_page(&self, url: &Url, closed: bool) -> Result<String> {
        if closed {
            if let Some(entry) = self.cache.get(url)? {
                debug!(url = %url, "serving closed-month index from cache");
                return Ok(String::from_utf8_lossy(&entry.content).into_owned());
            }
        }

        match self.client.get(url).await {
            Ok(body) => {
                self.cache.put(url, &body, Utc::now())?;
                Ok(String::from_utf8_lossy(&body).into_owned())
            }
            Err(err) => {
                // Mutable month: degrade to the cached copy if one exists.
                if let Some(entry) = self.cache.get(url)? {
                    warn!(url = %url, error = %err, "index fetch failed, using cached copy");
                    Ok(String::from_utf8_lossy(&entry.content).into_owned())
                } else {
                    Err(err)
                }
            }
        }
    }
}

struct IndexPage {
    message_urls: Vec<Url>,
    next_page: Option<Url>,
}

/// Harvest message links and the pagination link from an index page.
///
/// There is no reliable subject-line pattern across the archive's history,
/// so anything whose href contains `msg` counts as a message link.
fn parse_index_page(page_url: &Url, html: &str) -> Result<IndexPage> {
    let selector =
        Selector::parse("a[href]").map_err(|e| FetchError::IndexParse(e.to_string()))?;
    let document = Html::parse_document(html);

    let mut message_urls = Vec::new();
    let mut next_page = None;

    for anchor in document.select(&selector) {
        let href = match anchor.value().attr("href") {
            Some(href) => href,
            None => continue,
        };
        let text = anchor.text().collect::<String>();

        if text.trim().eq_ignore_ascii_case("next page") {
            next_page = page_url.join(href).ok();
        } else if href.contains("msg") {
            if let Ok(url) = page_url.join(href) {
                message_urls.push(url);
            }
        }
    }

    Ok(IndexPage {
        message_urls,
        next_page,
    })
}
