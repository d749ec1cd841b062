//! Request dispatch module
//!
//! Entry point for HTTP request processing. Runs the response pipeline in a
//! fixed order: method check, static file stage (with header policy), then
//! compression, and finally writes the access log line.

use crate::config::AppState;
use crate::handler::static_files;
use crate::http::{self, body::ResponseBody};
use crate::logger::{self, AccessLogEntry};
use hyper::header::{self, HeaderMap, HeaderName};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Request context encapsulating information needed for request processing
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub is_head: bool,
    pub if_none_match: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
    pub range: Option<&'a str>,
    pub if_range: Option<&'a str>,
    pub accept_encoding: Option<&'a str>,
}

impl<'a> RequestContext<'a> {
    /// Borrow the fields the pipeline needs from a request head
    pub fn from_parts(parts: &'a Parts) -> Self {
        let headers = &parts.headers;
        Self {
            path: parts.uri.path(),
            query: parts.uri.query(),
            is_head: parts.method == Method::HEAD,
            if_none_match: header_str(headers, &header::IF_NONE_MATCH),
            if_modified_since: header_str(headers, &header::IF_MODIFIED_SINCE),
            range: header_str(headers, &header::RANGE),
            if_range: header_str(headers, &header::IF_RANGE),
            accept_encoding: header_str(headers, &header::ACCEPT_ENCODING),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Main entry point for HTTP request handling
///
/// The request body is never read, so any body type is accepted.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    remote_addr: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible> {
    let started = Instant::now();
    let (parts, _body) = req.into_parts();
    let ctx = RequestContext::from_parts(&parts);

    // 1. Check HTTP method
    let response = match check_http_method(&parts.method) {
        Some(resp) => resp,
        // 2. Resolve, read and apply the header policy
        None => static_files::serve(&ctx, &state).await,
    };

    // 3. Compression wraps everything produced above
    let response = http::compress_response(
        response,
        ctx.accept_encoding,
        ctx.is_head,
        &state.config.compression,
    );

    if state.config.logging.access_log {
        let entry = access_entry(&parts, &response, remote_addr, started);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Return 405 for anything other than GET/HEAD
fn check_http_method(method: &Method) -> Option<Response<ResponseBody>> {
    match *method {
        Method::GET | Method::HEAD => None,
        _ => {
            tracing::debug!("Method not allowed: {method}");
            Some(http::build_405_response())
        }
    }
}

fn access_entry(
    parts: &Parts,
    response: &Response<ResponseBody>,
    remote_addr: SocketAddr,
    started: Instant,
) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        remote_addr.ip().to_string(),
        parts.method.to_string(),
        parts.uri.path().to_string(),
    );
    entry.query = parts.uri.query().map(ToString::to_string);
    entry.http_version = logger::http_version_str(parts.version).to_string();
    entry.status = response.status().as_u16();
    // Unknown for streamed compressed bodies
    entry.body_bytes = if parts.method == Method::HEAD {
        Some(0)
    } else {
        response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    };
    entry.referer = header_str(&parts.headers, &header::REFERER).map(ToString::to_string);
    entry.user_agent = header_str(&parts.headers, &header::USER_AGENT).map(ToString::to_string);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;
    use hyper::body::Bytes;
    use hyper::StatusCode;
    use std::io::Read;

    const REMOTE: &str = "127.0.0.1:50000";

    fn state_with_files<C: AsRef<[u8]>>(files: &[(&str, C)]) -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        let mut config = Config::default();
        config.files.root = dir.path().to_path_buf();
        config.logging.access_log = false;
        (dir, Arc::new(AppState::new(config).unwrap()))
    }

    async fn send(state: &Arc<AppState>, req: Request<()>) -> (Response<()>, Bytes) {
        let response = handle_request(req, Arc::clone(state), REMOTE.parse().unwrap())
            .await
            .unwrap();
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (Response::from_parts(parts, ()), bytes)
    }

    fn get(uri: &str) -> Request<()> {
        Request::get(uri).body(()).unwrap()
    }

    fn model_bytes() -> Vec<u8> {
        (0..10 * 1024).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_data_file_headers() {
        let model = model_bytes();
        let (_dir, state) = state_with_files(&[("model.data", &model)]);

        let (response, body) = send(&state, get("/model.data")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let h = response.headers();
        assert_eq!(h[header::CACHE_CONTROL], "public, max-age=31536000");
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            h[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Origin, X-Requested-With, Content-Type, Accept"
        );
        assert!(!h.contains_key("cross-origin-opener-policy"));
        assert_eq!(h[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(body.as_ref(), model.as_slice());
    }

    #[tokio::test]
    async fn test_html_default_headers() {
        let (_dir, state) = state_with_files(&[("index.html", b"<h1>hello</h1>")]);

        let (response, body) = send(&state, get("/index.html")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let h = response.headers();
        assert_eq!(h[header::CACHE_CONTROL], "no-store, max-age=0");
        assert_eq!(h["cross-origin-opener-policy"], "same-origin");
        assert_eq!(h["cross-origin-embedder-policy"], "require-corp");
        assert!(!h.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
        assert!(!h.contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
        assert_eq!(h[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(body.as_ref(), b"<h1>hello</h1>");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let (_dir, state) = state_with_files(&[("index.html", b"x")]);
        let (response, _) = send(&state, get("/missing.js")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_traversal_never_leaves_root() {
        let (_dir, state) = state_with_files(&[("index.html", b"x")]);
        let (response, body) = send(&state, get("/../../etc/passwd")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!body.windows(5).any(|w| w == b"root:"));
    }

    #[tokio::test]
    async fn test_root_serves_index() {
        let (_dir, state) = state_with_files(&[("index.html", b"<p>index</p>")]);
        let (response, body) = send(&state, get("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body.as_ref(), b"<p>index</p>");
    }

    #[tokio::test]
    async fn test_directory_redirect() {
        let (_dir, state) = state_with_files(&[("sub/index.html", b"x")]);
        let (response, _) = send(&state, get("/sub")).await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "/sub/");
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let (_dir, state) = state_with_files(&[("index.html", b"x")]);
        let req = Request::post("/index.html").body(()).unwrap();
        let (response, _) = send(&state, req).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, HEAD");
    }

    #[tokio::test]
    async fn test_head_has_headers_without_body() {
        let (_dir, state) = state_with_files(&[("model.data", b"0123456789")]);
        let req = Request::head("/model.data").body(()).unwrap();
        let (response, body) = send(&state, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=31536000");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_repeat_requests_identical() {
        let (_dir, state) = state_with_files(&[("app.js", b"export {}")]);
        let (first, first_body) = send(&state, get("/app.js")).await;
        let (second, second_body) = send(&state, get("/app.js")).await;
        assert_eq!(first.status(), second.status());
        assert_eq!(first.headers(), second.headers());
        assert_eq!(first_body, second_body);
    }

    #[tokio::test]
    async fn test_conditional_get_keeps_policy() {
        let (_dir, state) = state_with_files(&[("model.data", b"weights")]);
        let (first, _) = send(&state, get("/model.data")).await;
        let etag = first.headers()[header::ETAG].clone();

        let req = Request::get("/model.data")
            .header(header::IF_NONE_MATCH, etag)
            .body(())
            .unwrap();
        let (response, body) = send(&state, req).await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(body.is_empty());
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=31536000");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_range_request() {
        let model = model_bytes();
        let (_dir, state) = state_with_files(&[("model.data", &model)]);
        let req = Request::get("/model.data")
            .header(header::RANGE, "bytes=0-9")
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(())
            .unwrap();
        let (response, body) = send(&state, req).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-9/10240");
        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
        assert_eq!(body.as_ref(), &model[..10]);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let (_dir, state) = state_with_files(&[("a.txt", b"abc")]);
        let req = Request::get("/a.txt")
            .header(header::RANGE, "bytes=10-")
            .body(())
            .unwrap();
        let (response, _) = send(&state, req).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */3");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store, max-age=0");
    }

    #[tokio::test]
    async fn test_data_file_sent_uncompressed() {
        let model = model_bytes();
        let (_dir, state) = state_with_files(&[("model.data", &model)]);
        let req = Request::get("/model.data")
            .header(header::ACCEPT_ENCODING, "gzip, deflate")
            .body(())
            .unwrap();
        let (response, body) = send(&state, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10240");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=31536000");
        assert_eq!(body.as_ref(), model.as_slice());
    }

    #[tokio::test]
    async fn test_gzip_script_matches_file() {
        let script = "export const weights = [0.1, 0.2, 0.3];\n".repeat(512);
        let (_dir, state) = state_with_files(&[("app.js", script.as_bytes())]);
        let req = Request::get("/app.js")
            .header(header::ACCEPT_ENCODING, "gzip, deflate")
            .body(())
            .unwrap();
        let (response, body) = send(&state, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()[header::VARY], "Accept-Encoding");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store, max-age=0");

        let mut decoded = String::new();
        flate2::read::GzDecoder::new(body.as_ref())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, script);
    }

    #[tokio::test]
    async fn test_small_file_not_compressed() {
        let (_dir, state) = state_with_files(&[("tiny.js", b"1")]);
        let req = Request::get("/tiny.js")
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(())
            .unwrap();
        let (response, body) = send(&state, req).await;
        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
        assert_eq!(body.as_ref(), b"1");
    }

    #[tokio::test]
    async fn test_dotfile_hidden() {
        let (_dir, state) = state_with_files(&[(".env", b"SECRET=1")]);
        let (response, _) = send(&state, get("/.env")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_context_from_request() {
        let req = Request::head("/model.data?v=3")
            .header(header::ACCEPT_ENCODING, "gzip")
            .header(header::RANGE, "bytes=0-1")
            .body(())
            .unwrap();
        let (parts, ()) = req.into_parts();
        let ctx = RequestContext::from_parts(&parts);
        assert_eq!(ctx.path, "/model.data");
        assert_eq!(ctx.query, Some("v=3"));
        assert!(ctx.is_head);
        assert_eq!(ctx.accept_encoding, Some("gzip"));
        assert_eq!(ctx.range, Some("bytes=0-1"));
        assert_eq!(ctx.if_none_match, None);
    }
}
