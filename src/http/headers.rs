//! Response header policy
//!
//! The header set is chosen by one test: does the *request* path end in
//! `.data` (case-sensitive)? The resolved file path plays no part, so a
//! symlink named `x.data` pointing at an HTML file still gets the `.data`
//! headers.

use hyper::header::{HeaderMap, HeaderName, HeaderValue};

/// Request-path suffix that selects the long-lived, cross-origin policy
pub const DATA_SUFFIX: &str = ".data";

/// Ordered `(name, value)` header pairs
pub type HeaderPairs = &'static [(&'static str, &'static str)];

const DATA_HEADERS: HeaderPairs = &[
    ("cache-control", "public, max-age=31536000"),
    ("access-control-allow-origin", "*"),
    (
        "access-control-allow-headers",
        "Origin, X-Requested-With, Content-Type, Accept",
    ),
];

const DEFAULT_HEADERS: HeaderPairs = &[
    ("cache-control", "no-store, max-age=0"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-embedder-policy", "require-corp"),
];

/// Headers to set for a response to `request_path`
pub fn header_policy(request_path: &str) -> HeaderPairs {
    if request_path.ends_with(DATA_SUFFIX) {
        DATA_HEADERS
    } else {
        DEFAULT_HEADERS
    }
}

/// Set the policy headers on `headers`, replacing any earlier values
pub fn apply_header_policy(request_path: &str, headers: &mut HeaderMap) {
    for &(name, value) in header_policy(request_path) {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
}
