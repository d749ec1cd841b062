//! HTTP Range request parsing module
//!
//! Single `bytes=` ranges only (RFC 9110 §14). Multi-range and malformed
//! headers fall back to the full body.

/// Inclusive byte range resolved against a known length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for a body of `total` bytes
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

/// How to answer a request given its `Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Send the whole body (no header, malformed, or multi-range)
    Full,
    /// Send 206 with this slice
    Partial(ByteRange),
    /// Send 416
    Unsatisfiable,
}

/// Parse a `Range` header against a body of `len` bytes
///
/// Supported forms: `bytes=start-end`, `bytes=start-`, `bytes=-suffix`.
pub fn parse_range(range_header: Option<&str>, len: u64) -> RangeOutcome {
    let Some(spec) = range_header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return RangeOutcome::Full;
    };

    if spec.contains(',') {
        return RangeOutcome::Full;
    }

    let Some((first, last)) = spec.split_once('-') else {
        return RangeOutcome::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        return suffix_range(last, len);
    }

    let Ok(start) = first.parse::<u64>() else {
        return RangeOutcome::Full;
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(e) if e < start => return RangeOutcome::Full,
            Ok(e) => Some(e),
            Err(_) => return RangeOutcome::Full,
        }
    };

    if start >= len {
        return RangeOutcome::Unsatisfiable;
    }

    let last_byte = len - 1;
    RangeOutcome::Partial(ByteRange {
        start,
        end: end.map_or(last_byte, |e| e.min(last_byte)),
    })
}

/// `bytes=-N`: the final N bytes
fn suffix_range(suffix: &str, len: u64) -> RangeOutcome {
    let Ok(count) = suffix.parse::<u64>() else {
        return RangeOutcome::Full;
    };

    if count == 0 || len == 0 {
        return RangeOutcome::Unsatisfiable;
    }

    RangeOutcome::Partial(ByteRange {
        start: len.saturating_sub(count),
        end: len - 1,
    })
}
