//! Request handler module
//!
//! Dispatches every request through the static asset pipeline.

pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::{handle_request, RequestContext};
