//! Pipeline driver: enumerate months, fetch, parse, store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::archive::{FetchedMessage, HttpClient, IndexFetcher, MessageFetcher};
use crate::config::{Settings, EARLIEST_YEAR};
use crate::models::{ArchiveMonth, MessageLocation, ParseFailure};
use crate::parser::parse_upload;
use crate::repository::{CacheRepository, UploadHistoryRepository};

/// Per-run counters. Message-level failures are expected steady-state
/// outcomes, reported here rather than escalated.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestStats {
    pub months_synced: u64,
    pub months_failed: u64,
    pub messages_fetched: u64,
    pub cache_hits: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub parse_failures: u64,
    pub fetch_failures: u64,
}

/// Drives the fetch-cache-parse-store pipeline over the configured months.
pub struct IngestService {
    index: IndexFetcher,
    messages: MessageFetcher,
    uploads: UploadHistoryRepository,
    concurrency: usize,
    year: Option<i32>,
    month: Option<u32>,
}

impl IngestService {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        settings.ensure_directories()?;
        let base_url = settings
            .archive_base_url()
            .context("invalid archive url")?;
        let cache = Arc::new(CacheRepository::new(&settings.cache_path)?);
        let uploads = UploadHistoryRepository::new(&settings.output_path)?;
        let client = Arc::new(HttpClient::new(
            &settings.user_agent,
            Duration::from_secs(settings.request_timeout),
            Duration::from_millis(settings.request_delay_ms),
            settings.max_retries,
        )?);

        Ok(Self {
            index: IndexFetcher::new(Arc::clone(&client), Arc::clone(&cache), base_url),
            messages: MessageFetcher::new(client, cache),
            uploads,
            concurrency: settings.concurrency.max(1),
            year: settings.year,
            month: settings.month,
        })
    }

    /// Run the pipeline over every configured month.
    ///
    /// Completing enumeration is success; skipped months and messages are
    /// counted, logged, and recorded in the error log, never escalated.
    pub async fn run(&self) -> anyhow::Result<IngestStats> {
        // Captured once so the boundary month gets the same freshness
        // decision for the whole run.
        let today = ArchiveMonth::containing(Utc::now());
        let months = self.enumerate_months(today);
        info!(months = months.len(), "starting sync");

        let mut stats = IngestStats::default();
        for month in months {
            self.sync_month(month, today, &mut stats).await?;
        }

        info!(
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            parse_failures = stats.parse_failures,
            fetch_failures = stats.fetch_failures,
            months_failed = stats.months_failed,
            "sync complete"
        );
        Ok(stats)
    }

    /// Months to process, in chronological order, clipped to today.
    fn enumerate_months(&self, today: ArchiveMonth) -> Vec<ArchiveMonth> {
        let (from, to) = match (self.year, self.month) {
            (Some(year), Some(month)) => {
                (ArchiveMonth::new(year, month), ArchiveMonth::new(year, month))
            }
            (Some(year), None) => (ArchiveMonth::new(year, 1), ArchiveMonth::new(year, 12)),
            _ => (ArchiveMonth::new(EARLIEST_YEAR, 1), today),
        };
        ArchiveMonth::range_inclusive(from, to.min(today))
    }

    async fn sync_month(
        &self,
        month: ArchiveMonth,
        today: ArchiveMonth,
        stats: &mut IngestStats,
    ) -> anyhow::Result<()> {
        let locations = match self.index.fetch(month, today).await {
            Ok(locations) => locations,
            Err(err) => {
                warn!(month = %month, error = %err, "skipping month: index unavailable");
                stats.months_failed += 1;
                return Ok(());
            }
        };
        debug!(month = %month, messages = locations.len(), "processing month");

        let fetcher = &self.messages;
        let fetched: Vec<(MessageLocation, crate::archive::Result<FetchedMessage>)> =
            stream::iter(locations)
                .map(|location| async move {
                    let result = fetcher.fetch(&location).await;
                    (location, result)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        for (location, result) in fetched {
            match result {
                Ok(message) => {
                    if message.from_cache {
                        stats.cache_hits += 1;
                    } else {
                        stats.messages_fetched += 1;
                    }
                    self.import_message(&message.text, stats)?;
                }
                Err(err) => {
                    warn!(url = %location.url, error = %err, "skipping message: fetch failed");
                    self.uploads
                        .record_failure(&ParseFailure::fetch_failure(&location, &err))?;
                    stats.fetch_failures += 1;
                }
            }
        }

        stats.months_synced += 1;
        Ok(())
    }

    fn import_message(&self, text: &str, stats: &mut IngestStats) -> anyhow::Result<()> {
        match parse_upload(text) {
            Ok(upload) => {
                if self.uploads.insert_if_absent(&upload)? {
                    stats.inserted += 1;
                } else {
                    stats.duplicates += 1;
                }
            }
            Err(err) => {
                debug!(error = %err, "message did not parse");
                self.uploads
                    .record_failure(&ParseFailure::new(err.message_id(), text))?;
                stats.parse_failures += 1;
            }
        }
        Ok(())
    }
}
