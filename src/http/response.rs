//! HTTP response building module
//!
//! Builders for the non-file responses. Bodies are small and built in
//! memory.

use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};

use super::body::{self, ResponseBody};
use crate::error::ServeError;

/// Build a short `text/plain` response for an error status
pub fn build_status_response(status: StatusCode) -> Response<ResponseBody> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let text = format!("{} {reason}", status.as_u16());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CONTENT_LENGTH, text.len())
        .body(body::full(text))
        .unwrap_or_else(|e| {
            log_build_error(status, &e);
            fallback(status)
        })
}

/// Build the response for a failed request
pub fn build_error_response(err: &ServeError) -> Response<ResponseBody> {
    build_status_response(err.status())
}

/// Build 404 Not Found response
pub fn build_404_response() -> Response<ResponseBody> {
    build_status_response(StatusCode::NOT_FOUND)
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<ResponseBody> {
    let mut response = build_status_response(StatusCode::METHOD_NOT_ALLOWED);
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
    response
}

/// Build 301 redirect to the slash-terminated form of a directory path
pub fn build_redirect_response(location: &str) -> Response<ResponseBody> {
    let text = format!("Redirecting to {location}");

    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION, location)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CONTENT_LENGTH, text.len())
        .body(body::full(text))
        .unwrap_or_else(|e| {
            log_build_error(StatusCode::MOVED_PERMANENTLY, &e);
            fallback(StatusCode::NOT_FOUND)
        })
}

/// Build 416 Range Not Satisfiable response
pub fn build_416_response(total: u64) -> Response<ResponseBody> {
    let mut response = build_status_response(StatusCode::RANGE_NOT_SATISFIABLE);
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{total}")) {
        response.headers_mut().insert(header::CONTENT_RANGE, value);
    }
    response
}

fn fallback(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(body::empty());
    *response.status_mut() = status;
    response
}

/// Log response build error
fn log_build_error(status: StatusCode, error: &hyper::http::Error) {
    tracing::error!("Failed to build {status} response: {error}");
}
