//! Upload notification parsing.
//!
//! An upload notification is a machine-generated email whose body carries a
//! `Key: value` block (Source, Version, Date, Changed-By, Maintainer, an
//! optional Closes list) followed by free-form changelog/description payload.
//! Two renderings of the same message reach this module: plain RFC 822 text,
//! and the archive's HTML page for the message (which carries the id in an
//! `X-Message-Id` comment). Both are normalized into a line-oriented view and
//! run through the same field extractors.
//!
//! Each extractor is independently nullable; a single validation step at the
//! end turns any missing required field into a [`ParseError`]. A notification
//! either becomes a complete record or fails whole; partial records would
//! corrupt the downstream analytics this table feeds.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use regex::Regex;
use scraper::Html;
use thiserror::Error;

use crate::models::{ParsedUpload, UNKNOWN_MESSAGE_ID};

/// Errors from parsing a single notification. Never retried: the input is
/// static text, so the outcome cannot change.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing Message-Id")]
    MissingMessageId,
    #[error("missing {field} field in message {message_id}")]
    MissingField {
        message_id: String,
        field: &'static str,
    },
    #[error("invalid date `{raw}` in message {message_id}")]
    InvalidDate { message_id: String, raw: String },
    #[error("invalid {field} identity `{raw}` in message {message_id}")]
    InvalidIdentity {
        message_id: String,
        field: &'static str,
        raw: String,
    },
}

impl ParseError {
    /// Message id to attribute the failure to in the error log.
    pub fn message_id(&self) -> &str {
        match self {
            ParseError::MissingMessageId => UNKNOWN_MESSAGE_ID,
            ParseError::MissingField { message_id, .. }
            | ParseError::InvalidDate { message_id, .. }
            | ParseError::InvalidIdentity { message_id, .. } => message_id,
        }
    }
}

/// Parse raw message text into an upload record.
pub fn parse_upload(raw: &str) -> Result<ParsedUpload, ParseError> {
    let view = MessageView::from_raw(raw);
    let message_id = view.message_id.ok_or(ParseError::MissingMessageId)?;
    let fields = extract_fields(&view.lines);

    let source = require(fields.source, "Source", &message_id)?;
    let version = require(fields.version, "Version", &message_id)?;
    let raw_date = require(fields.date, "Date", &message_id)?;
    let changed_by = require(fields.changed_by, "Changed-By", &message_id)?;
    let maintainer = require(fields.maintainer, "Maintainer", &message_id)?;

    let date = parse_date(&raw_date).ok_or_else(|| ParseError::InvalidDate {
        message_id: message_id.clone(),
        raw: raw_date.clone(),
    })?;
    let (changed_by_name, changed_by_email) =
        parse_identity(&changed_by).ok_or_else(|| ParseError::InvalidIdentity {
            message_id: message_id.clone(),
            field: "Changed-By",
            raw: changed_by.clone(),
        })?;
    let (maintainer_name, maintainer_email) =
        parse_identity(&maintainer).ok_or_else(|| ParseError::InvalidIdentity {
            message_id: message_id.clone(),
            field: "Maintainer",
            raw: maintainer.clone(),
        })?;
    let closes = fields.closes.as_deref().map(parse_closes).unwrap_or_default();

    Ok(ParsedUpload {
        source,
        version,
        date,
        changed_by_name,
        changed_by_email,
        maintainer_name,
        maintainer_email,
        message_id,
        closes,
    })
}

fn require(
    value: Option<String>,
    field: &'static str,
    message_id: &str,
) -> Result<String, ParseError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ParseError::MissingField {
            message_id: message_id.to_string(),
            field,
        }),
    }
}

/// Normalized line-oriented view of a message, whatever shape it arrived in.
struct MessageView {
    message_id: Option<String>,
    lines: Vec<String>,
}

impl MessageView {
    fn from_raw(raw: &str) -> Self {
        if looks_like_archive_page(raw) {
            let text = html_text(raw);
            return Self {
                message_id: archive_message_id(raw),
                lines: text.lines().map(str::to_string).collect(),
            };
        }

        let parsed = MessageParser::default().parse(raw.as_bytes());
        let (mut message_id, body) = match &parsed {
            Some(message) => (
                message.message_id().and_then(normalize_message_id),
                message.body_text(0).map(|b| b.into_owned()),
            ),
            None => (None, None),
        };

        // Upload fields live in the body; the raw header block follows as a
        // fallback so header-only renderings still parse.
        let mut lines: Vec<String> = body
            .as_deref()
            .map(|b| b.lines().map(str::to_string).collect())
            .unwrap_or_default();
        lines.extend(
            raw.lines()
                .take_while(|l| !l.trim().is_empty())
                .map(str::to_string),
        );

        if message_id.is_none() {
            message_id = lines.iter().find_map(|line| {
                let (key, value) = split_field(line)?;
                if key.eq_ignore_ascii_case("message-id") {
                    normalize_message_id(value)
                } else {
                    None
                }
            });
        }

        Self { message_id, lines }
    }
}

fn looks_like_archive_page(raw: &str) -> bool {
    let head = raw.trim_start();
    raw.contains("<!--X-Message-Id:")
        || head.get(..9).is_some_and(|p| p.eq_ignore_ascii_case("<!doctype"))
        || head.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("<html"))
}

/// Message id from the archive page's `X-Message-Id` comment.
fn archive_message_id(raw: &str) -> Option<String> {
    static X_MESSAGE_ID: OnceLock<Regex> = OnceLock::new();
    let re = X_MESSAGE_ID
        .get_or_init(|| Regex::new(r"<!--X-Message-Id:\s*([^>]*?)\s*-->").expect("static regex"));
    let captured = re.captures(raw)?.get(1)?.as_str();
    normalize_message_id(&decode_entities(captured))
}

/// Text content of an HTML page, in document order. The archive renders
/// message bodies inside `<pre>`, so line structure survives extraction.
fn html_text(raw: &str) -> String {
    let document = Html::parse_document(raw);
    document.root_element().text().collect()
}

/// Normalize a message id to the bracketed `<local@host>` form, so the same
/// message keys identically regardless of which rendering it arrived in.
fn normalize_message_id(raw: &str) -> Option<String> {
    let inner = raw.trim().trim_matches(&['<', '>'][..]).trim();
    if inner.is_empty() {
        None
    } else {
        Some(format!("<{}>", inner))
    }
}

#[derive(Default)]
struct RawFields {
    source: Option<String>,
    version: Option<String>,
    date: Option<String>,
    changed_by: Option<String>,
    maintainer: Option<String>,
    closes: Option<String>,
}

/// Run the field extractors over the line view. First occurrence wins;
/// everything else (diffs, changelogs, list footers) is ignored.
fn extract_fields(lines: &[String]) -> RawFields {
    let mut fields = RawFields::default();
    for line in lines {
        let Some((key, value)) = split_field(line) else {
            continue;
        };
        let slot = match key.to_ascii_lowercase().as_str() {
            "source" => &mut fields.source,
            "version" => &mut fields.version,
            "date" => &mut fields.date,
            "changed-by" => &mut fields.changed_by,
            "maintainer" => &mut fields.maintainer,
            "closes" => &mut fields.closes,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
    fields
}

/// Split a `Key: value` line. Indented lines are changelog/continuation
/// payload, never field starts.
fn split_field(line: &str) -> Option<(&str, &str)> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    let (key, value) = line.split_once(':')?;
    let key = key.trim_end();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    Some((key, value.trim()))
}

/// Parse a notification date and normalize it to UTC. The field has been
/// RFC 2822 since the format stabilized; trailing `(TZ)` comments are
/// stripped before parsing.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned = match raw.find('(') {
        Some(idx) => raw[..idx].trim(),
        None => raw.trim(),
    };
    if let Ok(dt) = DateTime::parse_from_rfc2822(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }

    // Some historical notifications carry a weekday that disagrees with the
    // calendar date, which strict RFC 2822 parsing rejects. Drop the weekday
    // and parse the remainder.
    let without_weekday = cleaned
        .split_once(',')
        .map(|(_, rest)| rest.trim())
        .unwrap_or(cleaned);
    for format in ["%d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M %z"] {
        if let Ok(dt) = DateTime::parse_from_str(without_weekday, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    DateTime::parse_from_rfc3339(cleaned)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Split an identity field into display name and address. Accepts
/// `Name <addr>`, the older `addr (Name)` form, and a bare address.
fn parse_identity(raw: &str) -> Option<(String, String)> {
    let raw = raw.trim();

    if let (Some(lt), Some(gt)) = (raw.find('<'), raw.rfind('>')) {
        if lt >= gt {
            return None;
        }
        let email = raw[lt + 1..gt].trim();
        if !email.contains('@') {
            return None;
        }
        let name = raw[..lt].trim().trim_matches('"').trim();
        return Some((name.to_string(), email.to_string()));
    }

    if let Some(open) = raw.find('(') {
        if raw.ends_with(')') {
            let email = raw[..open].trim();
            let name = raw[open + 1..raw.len() - 1].trim();
            if email.contains('@') && !email.contains(' ') {
                return Some((name.to_string(), email.to_string()));
            }
            return None;
        }
    }

    if raw.contains('@') && !raw.contains(char::is_whitespace) {
        return Some((String::new(), raw.to_string()));
    }

    None
}

/// Bug numbers from a `Closes:` value. The separator drifted between spaces,
/// commas, and `#`-prefixed numbers over the years; harvest every number.
fn parse_closes(raw: &str) -> Vec<u32> {
    static BUG_NUMBER: OnceLock<Regex> = OnceLock::new();
    let re = BUG_NUMBER.get_or_init(|| Regex::new(r"\d+").expect("static regex"));
    re.find_iter(raw)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .collect()
}

/// Minimal entity decoding for values pulled out of archive HTML comments.
fn decode_entities(s: &str) -> String {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    let re = NUMERIC.get_or_init(|| Regex::new(r"&#(\d+);").expect("static regex"));
    let decoded = re.replace_all(s, |caps: &regex::Captures| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    decoded
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SCENARIO: &str = concat!(
        "Source: foo\n",
        "Version: 1.0-1\n",
        "Date: Mon, 1 Jan 2008 00:00:00 +0000\n",
        "Changed-By: A B <a@b.org>\n",
        "Maintainer: C D <c@d.org>\n",
        "Message-Id: <x@y>\n",
        "Closes: 123, 456\n",
    );

    #[test]
    fn test_parses_complete_notification() {
        let upload = parse_upload(SCENARIO).unwrap();
        assert_eq!(upload.source, "foo");
        assert_eq!(upload.version, "1.0-1");
        assert_eq!(
            upload.date,
            Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(upload.changed_by_name, "A B");
        assert_eq!(upload.changed_by_email, "a@b.org");
        assert_eq!(upload.maintainer_name, "C D");
        assert_eq!(upload.maintainer_email, "c@d.org");
        assert_eq!(upload.message_id, "<x@y>");
        assert_eq!(upload.closes, vec![123, 456]);
    }

    #[test]
    fn test_fields_from_email_body() {
        let raw = concat!(
            "From: archive@example.org\r\n",
            "To: debian-devel-changes@lists.example.org\r\n",
            "Subject: Accepted foo 1.0-1 (source all)\r\n",
            "Message-Id: <handler.foo.123@example.org>\r\n",
            "Date: Tue, 2 Jan 2008 09:00:00 +0000\r\n",
            "\r\n",
            "Format: 1.8\r\n",
            "Date: Mon, 1 Jan 2008 00:00:00 +0000\r\n",
            "Source: foo\r\n",
            "Binary: foo\r\n",
            "Architecture: source all\r\n",
            "Version: 1.0-1\r\n",
            "Distribution: unstable\r\n",
            "Maintainer: C D <c@d.org>\r\n",
            "Changed-By: A B <a@b.org>\r\n",
            "Description:\r\n",
            " foo - does foo things\r\n",
            "Closes: 123 456\r\n",
            "Changes:\r\n",
            " foo (1.0-1) unstable; urgency=low\r\n",
            " .\r\n",
            "   * Initial release (Closes: #999)\r\n",
        );
        let upload = parse_upload(raw).unwrap();
        assert_eq!(upload.message_id, "<handler.foo.123@example.org>");
        // The body's upload date wins over the transport Date header.
        assert_eq!(
            upload.date,
            Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap()
        );
        // The indented changelog Closes must not leak into the field.
        assert_eq!(upload.closes, vec![123, 456]);
        assert_eq!(upload.source, "foo");
    }

    #[test]
    fn test_parses_archive_html_page() {
        let raw = concat!(
            "<!DOCTYPE html>\n",
            "<!--X-Message-Id: handler.bar.456&#64;example.org -->\n",
            "<html><head><title>Accepted bar 2.0-3 (source)</title></head>\n",
            "<body>\n",
            "<li><em>Date</em>: Sat, 5 Apr 2008 12:30:00 +0200</li>\n",
            "<pre>\n",
            "Source: bar\n",
            "Version: 2.0-3\n",
            "Date: Sat, 5 Apr 2008 12:30:00 +0200\n",
            "Maintainer: C D &lt;c@d.org&gt;\n",
            "Changed-By: A B &lt;a@b.org&gt;\n",
            "Closes: 777\n",
            "</pre>\n",
            "</body></html>\n",
        );
        let upload = parse_upload(raw).unwrap();
        assert_eq!(upload.message_id, "<handler.bar.456@example.org>");
        assert_eq!(upload.source, "bar");
        assert_eq!(upload.version, "2.0-3");
        assert_eq!(upload.maintainer_email, "c@d.org");
        assert_eq!(upload.closes, vec![777]);
        // +0200 normalized to UTC.
        assert_eq!(
            upload.date,
            Utc.with_ymd_and_hms(2008, 4, 5, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_version_is_a_failure() {
        let raw = SCENARIO.replace("Version: 1.0-1\n", "");
        let err = parse_upload(&raw).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingField {
                field: "Version",
                ..
            }
        ));
        assert_eq!(err.message_id(), "<x@y>");
    }

    #[test]
    fn test_missing_message_id_uses_placeholder() {
        let raw = SCENARIO.replace("Message-Id: <x@y>\n", "");
        let err = parse_upload(&raw).unwrap_err();
        assert!(matches!(err, ParseError::MissingMessageId));
        assert_eq!(err.message_id(), UNKNOWN_MESSAGE_ID);
    }

    #[test]
    fn test_invalid_date_is_a_failure() {
        let raw = SCENARIO.replace(
            "Date: Mon, 1 Jan 2008 00:00:00 +0000\n",
            "Date: sometime in January\n",
        );
        let err = parse_upload(&raw).unwrap_err();
        assert!(matches!(err, ParseError::InvalidDate { .. }));
    }

    #[test]
    fn test_invalid_identity_is_a_failure() {
        let raw = SCENARIO.replace(
            "Changed-By: A B <a@b.org>\n",
            "Changed-By: somebody, somewhere\n",
        );
        let err = parse_upload(&raw).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidIdentity {
                field: "Changed-By",
                ..
            }
        ));
    }

    #[test]
    fn test_date_normalized_to_utc() {
        let raw = SCENARIO.replace(
            "Date: Mon, 1 Jan 2008 00:00:00 +0000\n",
            "Date: Mon, 1 Jan 2008 06:30:00 +0630 (ICT)\n",
        );
        let upload = parse_upload(&raw).unwrap();
        assert_eq!(
            upload.date,
            Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_date_with_wrong_weekday_still_parses() {
        // Jan 1 2008 was a Tuesday; strict RFC 2822 parsing rejects the
        // mismatched weekday, but the field must still be accepted.
        assert_eq!(
            parse_date("Mon, 1 Jan 2008 00:00:00 +0000"),
            Some(Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_date("Tue, 1 Jan 2008 00:00:00 +0000"),
            Some(Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date("sometime in January"), None);
    }

    #[test]
    fn test_closes_separator_variants() {
        assert_eq!(parse_closes("123, 456"), vec![123, 456]);
        assert_eq!(parse_closes("123 456"), vec![123, 456]);
        assert_eq!(parse_closes("#123, #456"), vec![123, 456]);
        assert_eq!(parse_closes(""), Vec::<u32>::new());
    }

    #[test]
    fn test_empty_closes_field_yields_no_bugs() {
        let raw = SCENARIO.replace("Closes: 123, 456\n", "Closes:\n");
        let upload = parse_upload(&raw).unwrap();
        assert!(upload.closes.is_empty());
    }

    #[test]
    fn test_absent_closes_field_yields_no_bugs() {
        let raw = SCENARIO.replace("Closes: 123, 456\n", "");
        let upload = parse_upload(&raw).unwrap();
        assert!(upload.closes.is_empty());
    }

    #[test]
    fn test_identity_forms() {
        assert_eq!(
            parse_identity("A B <a@b.org>"),
            Some(("A B".to_string(), "a@b.org".to_string()))
        );
        assert_eq!(
            parse_identity("a@b.org (A B)"),
            Some(("A B".to_string(), "a@b.org".to_string()))
        );
        assert_eq!(
            parse_identity("a@b.org"),
            Some((String::new(), "a@b.org".to_string()))
        );
        assert_eq!(
            parse_identity("\"Ünël Täst\" <u@t.example>"),
            Some(("Ünël Täst".to_string(), "u@t.example".to_string()))
        );
        assert_eq!(parse_identity("no address here"), None);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let raw = format!("{}Source: shadow\nVersion: 9.9-9\n", SCENARIO);
        let upload = parse_upload(&raw).unwrap();
        assert_eq!(upload.source, "foo");
        assert_eq!(upload.version, "1.0-1");
    }

    #[test]
    fn test_prose_lines_are_not_fields() {
        // A colon inside prose must not register as a field.
        let raw = format!("{}note that this line: is not a field\n", SCENARIO);
        let upload = parse_upload(&raw).unwrap();
        assert_eq!(upload.source, "foo");
    }

    #[test]
    fn test_message_id_normalization() {
        assert_eq!(normalize_message_id(" <x@y> "), Some("<x@y>".to_string()));
        assert_eq!(normalize_message_id("x@y"), Some("<x@y>".to_string()));
        assert_eq!(normalize_message_id("  "), None);
        assert_eq!(normalize_message_id("<>"), None);
    }
}
