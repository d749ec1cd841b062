//! Response compression
//!
//! Wraps the whole response pipeline: whatever the static stage produced is
//! inspected here and, when the client accepts gzip or deflate, the content
//! type is compressible and the body is big enough, its body is re-streamed
//! through an encoder.

use async_compression::tokio::bufread::{GzipEncoder, ZlibEncoder};
use async_compression::Level;
use http_body_util::BodyExt;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Response, StatusCode};
use tokio_util::io::StreamReader;

use super::body::{self, ResponseBody};
use crate::config::CompressionConfig;

/// Content codings this server produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gzip,
    /// HTTP "deflate": a zlib-wrapped deflate stream
    Deflate,
}

impl Encoding {
    /// Get the content-encoding header value
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }

    /// Re-stream `input` through the encoder at `level` (clamped to 0..=9)
    ///
    /// Encoding happens chunk by chunk as the body is polled.
    pub fn encode(self, input: ResponseBody, level: u32) -> ResponseBody {
        let level = Level::Precise(i32::try_from(level.min(9)).unwrap_or(6));
        let reader = StreamReader::new(input.into_data_stream());
        match self {
            Self::Gzip => body::stream(GzipEncoder::with_quality(reader, level)),
            Self::Deflate => body::stream(ZlibEncoder::with_quality(reader, level)),
        }
    }
}

/// Pick an encoding from an `Accept-Encoding` header value
///
/// Honours q-values; `q=0` rules a coding out and `*` stands for any coding
/// not listed explicitly. Gzip wins ties.
pub fn negotiate(accept_encoding: &str) -> Option<Encoding> {
    let mut gzip = None;
    let mut deflate = None;
    let mut wildcard = None;

    for item in accept_encoding.split(',') {
        let mut parts = item.split(';');
        let coding = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let quality = parts
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);

        match coding.as_str() {
            "gzip" | "x-gzip" => gzip = Some(quality),
            "deflate" => deflate = Some(quality),
            "*" => wildcard = Some(quality),
            _ => {}
        }
    }

    let gzip = gzip.or(wildcard).unwrap_or(0.0);
    let deflate = deflate.or(wildcard).unwrap_or(0.0);

    if gzip > 0.0 && gzip >= deflate {
        Some(Encoding::Gzip)
    } else if deflate > 0.0 {
        Some(Encoding::Deflate)
    } else {
        None
    }
}

/// Whether a `Content-Type` is worth compressing
///
/// Text, JSON/XML-family, JavaScript, wasm and uncompressed font/image
/// formats qualify. Raw binary (`application/octet-stream`, so every `.data`
/// asset) and formats that are already compressed do not, and neither does a
/// missing type.
pub fn is_compressible(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence.starts_with("text/")
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
        || essence.ends_with("+text")
    {
        return true;
    }

    matches!(
        essence.as_str(),
        "application/javascript"
            | "application/json"
            | "application/xml"
            | "application/wasm"
            | "image/x-icon"
            | "image/bmp"
            | "font/ttf"
            | "font/otf"
    )
}

/// Compression stage of the response pipeline
///
/// Leaves the response untouched when compression is disabled or the
/// response carries `Cache-Control: no-transform`. Otherwise adds
/// `Vary: Accept-Encoding` and compresses full (200) non-HEAD bodies of a
/// compressible type whose `Content-Length` is at least `min_size` and that
/// are not already encoded. The compressed body is streamed without a
/// `Content-Length`.
pub fn compress_response(
    mut response: Response<ResponseBody>,
    accept_encoding: Option<&str>,
    is_head: bool,
    config: &CompressionConfig,
) -> Response<ResponseBody> {
    if !config.enabled || has_no_transform(response.headers()) {
        return response;
    }

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));

    let headers = response.headers();
    let compressible = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_compressible);
    let large_enough = content_length(headers).map_or(true, |len| len >= config.min_size as u64);

    if is_head
        || response.status() != StatusCode::OK
        || headers.contains_key(header::CONTENT_ENCODING)
        || !compressible
        || !large_enough
    {
        return response;
    }

    let Some(encoding) = accept_encoding.and_then(negotiate) else {
        return response;
    };

    let (mut parts, input) = response.into_parts();
    parts.headers.insert(
        header::CONTENT_ENCODING,
        HeaderValue::from_static(encoding.as_str()),
    );
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::ACCEPT_RANGES);
    weaken_etag(&mut parts.headers);

    Response::from_parts(parts, encoding.encode(input, config.level))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn has_no_transform(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|d| d.trim().eq_ignore_ascii_case("no-transform"))
}

/// A compressed body is not byte-identical to the original, so a strong
/// `ETag` must not be reused for it.
fn weaken_etag(headers: &mut HeaderMap) {
    let Some(etag) = headers.get(header::ETAG).and_then(|v| v.to_str().ok()) else {
        return;
    };
    if etag.starts_with("W/") {
        return;
    }
    if let Ok(weak) = HeaderValue::from_str(&format!("W/{etag}")) {
        headers.insert(header::ETAG, weak);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{GzDecoder, ZlibDecoder};
    use hyper::body::Bytes;
    use std::io::Read;

    fn body_of(len: usize) -> Bytes {
        Bytes::from("let x = 42; // static_responder\n".repeat(len / 32 + 1)[..len].to_string())
    }

    fn ok_response(data: Bytes, content_type: &str) -> Response<ResponseBody> {
        Response::builder()
            .status(200)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, data.len())
            .header(header::ETAG, "\"abc\"")
            .header(header::ACCEPT_RANGES, "bytes")
            .body(body::full(data))
            .unwrap()
    }

    fn js_response(data: Bytes) -> Response<ResponseBody> {
        ok_response(data, "application/javascript")
    }

    async fn collect(response: Response<ResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[test]
    fn test_negotiate() {
        assert_eq!(negotiate("gzip"), Some(Encoding::Gzip));
        assert_eq!(negotiate("gzip, deflate, br"), Some(Encoding::Gzip));
        assert_eq!(negotiate("deflate"), Some(Encoding::Deflate));
        assert_eq!(negotiate("gzip;q=0.5, deflate"), Some(Encoding::Deflate));
        assert_eq!(negotiate("gzip;q=0, deflate;q=0"), None);
        assert_eq!(negotiate("*"), Some(Encoding::Gzip));
        assert_eq!(negotiate("gzip;q=0, *"), Some(Encoding::Deflate));
        assert_eq!(negotiate("identity"), None);
        assert_eq!(negotiate("br"), None);
        assert_eq!(negotiate(""), None);
    }

    #[test]
    fn test_is_compressible() {
        assert!(is_compressible("text/html; charset=utf-8"));
        assert!(is_compressible("application/javascript"));
        assert!(is_compressible("application/json"));
        assert!(is_compressible("image/svg+xml"));
        assert!(is_compressible("application/manifest+json"));
        assert!(is_compressible("application/wasm"));

        assert!(!is_compressible("application/octet-stream"));
        assert!(!is_compressible("image/png"));
        assert!(!is_compressible("font/woff2"));
        assert!(!is_compressible("application/zip"));
        assert!(!is_compressible("application/gzip"));
        assert!(!is_compressible("video/mp4"));
    }

    #[tokio::test]
    async fn test_gzip_roundtrip() {
        let data = body_of(10 * 1024);
        let response = compress_response(
            js_response(data.clone()),
            Some("gzip, deflate"),
            false,
            &CompressionConfig::default(),
        );

        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()[header::VARY], "Accept-Encoding");
        assert!(!response.headers().contains_key(header::CONTENT_LENGTH));
        assert_eq!(response.headers()[header::ETAG], "W/\"abc\"");
        assert!(!response.headers().contains_key(header::ACCEPT_RANGES));

        let compressed = collect(response).await;
        assert!(compressed.len() < data.len());
        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_ref())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, data.as_ref());
    }

    #[tokio::test]
    async fn test_deflate_is_zlib() {
        let data = body_of(4096);
        let response = compress_response(
            js_response(data.clone()),
            Some("deflate"),
            false,
            &CompressionConfig::default(),
        );

        assert_eq!(response.headers()[header::CONTENT_ENCODING], "deflate");
        let compressed = collect(response).await;
        let mut decoded = Vec::new();
        ZlibDecoder::new(compressed.as_ref())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, data.as_ref());
    }

    #[tokio::test]
    async fn test_octet_stream_not_compressed() {
        let data = body_of(64 * 1024);
        let response = compress_response(
            ok_response(data.clone(), "application/octet-stream"),
            Some("gzip, deflate"),
            false,
            &CompressionConfig::default(),
        );

        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
        assert_eq!(response.headers()[header::VARY], "Accept-Encoding");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "65536");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(collect(response).await, data);
    }

    #[tokio::test]
    async fn test_below_threshold_untouched() {
        let data = body_of(1023);
        let response = compress_response(
            js_response(data.clone()),
            Some("gzip"),
            false,
            &CompressionConfig::default(),
        );
        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
        assert_eq!(response.headers()[header::VARY], "Accept-Encoding");
        assert_eq!(collect(response).await, data);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let response = compress_response(
            js_response(body_of(1024)),
            Some("gzip"),
            false,
            &CompressionConfig::default(),
        );
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    }

    #[test]
    fn test_head_and_partial_untouched() {
        let config = CompressionConfig::default();

        let head = compress_response(js_response(body_of(4096)), Some("gzip"), true, &config);
        assert!(!head.headers().contains_key(header::CONTENT_ENCODING));

        let mut partial = js_response(body_of(4096));
        *partial.status_mut() = StatusCode::PARTIAL_CONTENT;
        let partial = compress_response(partial, Some("gzip"), false, &config);
        assert!(!partial.headers().contains_key(header::CONTENT_ENCODING));
    }

    #[tokio::test]
    async fn test_no_accept_encoding() {
        let data = body_of(4096);
        let response = compress_response(
            js_response(data.clone()),
            None,
            false,
            &CompressionConfig::default(),
        );
        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
        assert_eq!(collect(response).await, data);
    }

    #[test]
    fn test_disabled() {
        let config = CompressionConfig {
            enabled: false,
            ..CompressionConfig::default()
        };
        let response = compress_response(js_response(body_of(4096)), Some("gzip"), false, &config);
        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
        assert!(!response.headers().contains_key(header::VARY));
    }

    #[test]
    fn test_no_transform_respected() {
        let mut response = js_response(body_of(4096));
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, no-transform"),
        );
        let response =
            compress_response(response, Some("gzip"), false, &CompressionConfig::default());
        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
    }
}
