//! Core domain types for the upload-history pipeline.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// One month of the mailing-list archive, identified by its index page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArchiveMonth {
    pub year: i32,
    /// 1-12.
    pub month: u32,
}

impl ArchiveMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// The month containing the given instant (UTC).
    pub fn containing(now: DateTime<Utc>) -> Self {
        Self {
            year: now.year(),
            month: now.month(),
        }
    }

    /// Whether this month can no longer receive new postings, relative to a
    /// "today" month captured once per run.
    pub fn is_closed(&self, today: ArchiveMonth) -> bool {
        *self < today
    }

    /// The following calendar month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// All months from `from` through `to`, inclusive, in chronological order.
    pub fn range_inclusive(from: ArchiveMonth, to: ArchiveMonth) -> Vec<ArchiveMonth> {
        let mut months = Vec::new();
        let mut current = from;
        while current <= to {
            months.push(current);
            current = current.next();
        }
        months
    }
}

impl fmt::Display for ArchiveMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Location of one message within the archive, produced by the index fetcher
/// and consumed by the message fetcher. Never persisted.
#[derive(Debug, Clone)]
pub struct MessageLocation {
    pub month: ArchiveMonth,
    pub url: Url,
}

/// A fully parsed upload notification, ready for storage.
///
/// `message_id` is the natural key; it is normalized to the bracketed
/// `<local@host>` form so the same message hashes identically regardless of
/// which rendering of the archive it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUpload {
    pub source: String,
    pub version: String,
    pub date: DateTime<Utc>,
    pub changed_by_name: String,
    pub changed_by_email: String,
    pub maintainer_name: String,
    pub maintainer_email: String,
    pub message_id: String,
    /// Bug numbers from the `Closes:` field, zero or more.
    pub closes: Vec<u32>,
}

/// Placeholder used when a failure cannot be attributed to a message id.
pub const UNKNOWN_MESSAGE_ID: &str = "unknown";

/// A message that could not be turned into an [`ParsedUpload`], kept verbatim
/// for offline diagnosis. Write-only, append-only.
#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub message_id: String,
    pub raw_text: String,
}

impl ParseFailure {
    pub fn new(message_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            raw_text: raw_text.into(),
        }
    }

    /// Failure record for a message that could not be fetched at all.
    pub fn fetch_failure(location: &MessageLocation, error: &impl fmt::Display) -> Self {
        Self {
            message_id: UNKNOWN_MESSAGE_ID.to_string(),
            raw_text: format!("fetch failed for {}: {}", location.url, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_ordering_and_closed() {
        let today = ArchiveMonth::new(2020, 6);
        assert!(ArchiveMonth::new(2020, 5).is_closed(today));
        assert!(ArchiveMonth::new(2019, 12).is_closed(today));
        assert!(!ArchiveMonth::new(2020, 6).is_closed(today));
        assert!(!ArchiveMonth::new(2020, 7).is_closed(today));
    }

    #[test]
    fn test_month_next_wraps_year() {
        assert_eq!(
            ArchiveMonth::new(2008, 12).next(),
            ArchiveMonth::new(2009, 1)
        );
        assert_eq!(ArchiveMonth::new(2008, 3).next(), ArchiveMonth::new(2008, 4));
    }

    #[test]
    fn test_month_range_inclusive() {
        let months =
            ArchiveMonth::range_inclusive(ArchiveMonth::new(2008, 11), ArchiveMonth::new(2009, 2));
        assert_eq!(
            months,
            vec![
                ArchiveMonth::new(2008, 11),
                ArchiveMonth::new(2008, 12),
                ArchiveMonth::new(2009, 1),
                ArchiveMonth::new(2009, 2),
            ]
        );
    }

    #[test]
    fn test_month_display() {
        assert_eq!(ArchiveMonth::new(2008, 3).to_string(), "2008-03");
    }
}
