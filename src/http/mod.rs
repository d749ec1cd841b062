//! HTTP protocol layer module
//!
//! Protocol building blocks used by the static file handler: header policy,
//! cache validation, ranges, content types, compression, body types and
//! canned responses.

pub mod body;
pub mod cache;
pub mod compress;
pub mod headers;
pub mod mime;
pub mod range;
pub mod response;

// Re-export commonly used items
pub use body::ResponseBody;
pub use compress::compress_response;
pub use headers::{apply_header_policy, header_policy};
pub use range::{parse_range, RangeOutcome};
pub use response::{
    build_404_response, build_405_response, build_416_response, build_error_response,
    build_redirect_response,
};
