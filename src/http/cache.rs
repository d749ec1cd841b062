//! HTTP cache validation module
//!
//! Provides `ETag`/`Last-Modified` generation from file metadata and
//! conditional request handling (`If-None-Match`, `If-Modified-Since`,
//! `If-Range`).

use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Validators sent with a file response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validators {
    /// Weak `ETag`, e.g. `W/"2800-18c1a2b3c4d"`
    pub etag: String,
    /// Modification time truncated to whole seconds
    pub last_modified: Option<DateTime<Utc>>,
}

impl Validators {
    /// Derive validators from file size and modification time
    pub fn from_metadata(len: u64, modified: Option<SystemTime>) -> Self {
        let millis = modified
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_millis());
        let last_modified = modified
            .map(DateTime::<Utc>::from)
            .and_then(|t| DateTime::from_timestamp(t.timestamp(), 0));

        Self {
            etag: format!("W/\"{len:x}-{millis:x}\""),
            last_modified,
        }
    }

    /// `Last-Modified` header value
    pub fn last_modified_header(&self) -> Option<String> {
        self.last_modified.map(format_http_date)
    }

    /// Whether the client's cached copy is still fresh (answer 304)
    ///
    /// `If-None-Match` takes precedence; `If-Modified-Since` is only
    /// consulted when no `If-None-Match` was sent.
    pub fn is_not_modified(
        &self,
        if_none_match: Option<&str>,
        if_modified_since: Option<&str>,
    ) -> bool {
        if let Some(inm) = if_none_match {
            return check_etag_match(inm, &self.etag);
        }

        match (if_modified_since.and_then(parse_http_date), self.last_modified) {
            (Some(since), Some(modified)) => modified <= since,
            _ => false,
        }
    }

    /// Whether an `If-Range` precondition allows honouring `Range`
    pub fn if_range_matches(&self, if_range: Option<&str>) -> bool {
        let Some(value) = if_range.map(str::trim) else {
            return true;
        };

        if value.starts_with('"') || value.starts_with("W/") {
            // Weak validators never satisfy If-Range, but ours are all weak;
            // accept an exact echo of what we sent.
            return value == self.etag;
        }

        match (parse_http_date(value), self.last_modified) {
            (Some(date), Some(modified)) => date == modified,
            _ => false,
        }
    }
}

/// Format a timestamp as an HTTP-date
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

/// Parse an HTTP-date (IMF-fixdate or any RFC 2822 form)
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Check if client's `If-None-Match` header matches the server's `ETag`
///
/// Uses weak comparison: `W/"x"` and `"x"` are equal. Supports lists and `*`.
pub fn check_etag_match(if_none_match: &str, etag: &str) -> bool {
    let ours = strip_weak(etag);
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || strip_weak(candidate) == ours)
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}
