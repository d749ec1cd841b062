//! Static file serving module
//!
//! Maps a request path onto the root directory, applies the safety checks,
//! and builds the file response (200/206/304/416) with the header policy of
//! the request path.

use crate::config::{AppState, DotfilesPolicy, FilesConfig};
use crate::error::ServeError;
use crate::handler::router::RequestContext;
use crate::http::body::{self, ResponseBody};
use crate::http::{self, cache::Validators, mime, RangeOutcome};
use hyper::header;
use hyper::{Response, StatusCode};
use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Where a request path landed on disk
#[derive(Debug)]
pub enum Resolved {
    /// A regular file under the root
    File { path: PathBuf, metadata: Metadata },
    /// A directory requested without its trailing slash
    Redirect(String),
}

/// Serve the request from the root directory
///
/// Never fails: resolution and open errors become 400/403/404/500 responses.
pub async fn serve(ctx: &RequestContext<'_>, state: &AppState) -> Response<ResponseBody> {
    match serve_file(ctx, state).await {
        Ok(response) => response,
        Err(err) => {
            match &err {
                ServeError::NotFound(_) | ServeError::BadRequest(_) => {
                    tracing::debug!("{err}");
                }
                ServeError::Forbidden(_) => tracing::warn!("Blocked request: {err}"),
                ServeError::Io { .. } => tracing::error!("{err}"),
            }
            http::build_error_response(&err)
        }
    }
}

async fn serve_file(
    ctx: &RequestContext<'_>,
    state: &AppState,
) -> Result<Response<ResponseBody>, ServeError> {
    let resolved = resolve(&state.root, ctx.path, ctx.query, &state.config.files).await?;
    let (path, metadata) = match resolved {
        Resolved::Redirect(location) => return Ok(http::build_redirect_response(&location)),
        Resolved::File { path, metadata } => (path, metadata),
    };

    let validators = Validators::from_metadata(metadata.len(), metadata.modified().ok());

    let mut response = if validators.is_not_modified(ctx.if_none_match, ctx.if_modified_since) {
        build_304_response(&validators)
    } else {
        build_file_response(ctx, &path, metadata.len(), &validators).await?
    };

    // Keyed on the request path, not on `path`
    http::apply_header_policy(ctx.path, response.headers_mut());
    Ok(response)
}

/// Open `path` and stream `length` bytes starting at `offset`
async fn open_body(path: &Path, offset: u64, length: u64) -> io::Result<ResponseBody> {
    let mut file = fs::File::open(path).await?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset)).await?;
    }
    Ok(body::stream(file.take(length)))
}

/// Decode and normalise a request path into segments below the root
///
/// `..` may step back out of a subdirectory but never above the root.
pub fn normalize_path(
    request_path: &str,
    dotfiles: DotfilesPolicy,
) -> Result<Vec<String>, ServeError> {
    let decoded = urlencoding::decode(request_path)
        .map_err(|_| ServeError::BadRequest(request_path.to_string()))?;

    if decoded.contains('\0') {
        return Err(ServeError::BadRequest(request_path.to_string()));
    }

    let mut segments: Vec<String> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(ServeError::Forbidden(request_path.to_string()));
                }
            }
            s => segments.push(s.to_string()),
        }
    }

    if segments.iter().any(|s| s.starts_with('.')) {
        match dotfiles {
            DotfilesPolicy::Ignore => return Err(ServeError::NotFound(request_path.to_string())),
            DotfilesPolicy::Deny => return Err(ServeError::Forbidden(request_path.to_string())),
            DotfilesPolicy::Allow => {}
        }
    }

    Ok(segments)
}

/// Resolve a request path to a file under `root` (which must be canonical)
pub async fn resolve(
    root: &Path,
    request_path: &str,
    query: Option<&str>,
    files: &FilesConfig,
) -> Result<Resolved, ServeError> {
    let segments = normalize_path(request_path, files.dotfiles)?;
    let candidate = segments
        .iter()
        .fold(root.to_path_buf(), |path, segment| path.join(segment));

    let canonical = contained(root, &candidate, request_path).await?;
    let metadata = fs::metadata(&canonical)
        .await
        .map_err(|e| classify_io_error(e, request_path, &canonical))?;

    if !metadata.is_dir() {
        // A trailing slash names a directory, and this is a file
        if request_path.ends_with('/') {
            return Err(ServeError::NotFound(request_path.to_string()));
        }
        return Ok(Resolved::File {
            path: canonical,
            metadata,
        });
    }

    if !request_path.ends_with('/') {
        // Collapse leading slashes so "//host" can't become an off-site redirect
        let mut location = format!("/{}/", request_path.trim_start_matches('/'));
        if let Some(q) = query {
            location.push('?');
            location.push_str(q);
        }
        return Ok(Resolved::Redirect(location));
    }

    for index_file in &files.index_files {
        let index_path = canonical.join(index_file);
        let Ok(index_canonical) = contained(root, &index_path, request_path).await else {
            continue;
        };
        if let Ok(meta) = fs::metadata(&index_canonical).await {
            if meta.is_file() {
                return Ok(Resolved::File {
                    path: index_canonical,
                    metadata: meta,
                });
            }
        }
    }

    Err(ServeError::NotFound(request_path.to_string()))
}

/// Canonicalise `path` and make sure symlinks did not lead out of `root`
async fn contained(root: &Path, path: &Path, request_path: &str) -> Result<PathBuf, ServeError> {
    let canonical = fs::canonicalize(path)
        .await
        .map_err(|e| classify_io_error(e, request_path, path))?;

    if canonical.starts_with(root) {
        Ok(canonical)
    } else {
        tracing::warn!(
            "Path traversal attempt blocked: {} -> {}",
            request_path,
            canonical.display()
        );
        Err(ServeError::Forbidden(request_path.to_string()))
    }
}

fn classify_io_error(err: io::Error, request_path: &str, path: &Path) -> ServeError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => {
            ServeError::NotFound(request_path.to_string())
        }
        _ => ServeError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    }
}

/// Build 304 Not Modified response
fn build_304_response(validators: &Validators) -> Response<ResponseBody> {
    let mut builder = Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(header::ETAG, &validators.etag);
    if let Some(last_modified) = validators.last_modified_header() {
        builder = builder.header(header::LAST_MODIFIED, last_modified);
    }

    builder.body(body::empty()).unwrap_or_else(|e| {
        tracing::error!("Failed to build 304 response: {e}");
        http::build_404_response()
    })
}

/// Build the 200/206 (or 416) response for a file of `total` bytes
///
/// The body streams from disk; HEAD answers from metadata alone and never
/// opens the file.
async fn build_file_response(
    ctx: &RequestContext<'_>,
    path: &Path,
    total: u64,
    validators: &Validators,
) -> Result<Response<ResponseBody>, ServeError> {
    let outcome = if validators.if_range_matches(ctx.if_range) {
        http::parse_range(ctx.range, total)
    } else {
        RangeOutcome::Full
    };

    let (status, offset, length, content_range) = match outcome {
        RangeOutcome::Unsatisfiable => return Ok(http::build_416_response(total)),
        RangeOutcome::Partial(range) => (
            StatusCode::PARTIAL_CONTENT,
            range.start,
            range.len(),
            Some(range.content_range(total)),
        ),
        RangeOutcome::Full => (StatusCode::OK, 0, total, None),
    };

    let body = if ctx.is_head {
        body::empty()
    } else {
        open_body(path, offset, length)
            .await
            .map_err(|e| classify_io_error(e, ctx.path, path))?
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, mime::content_type_for(path))
        .header(header::CONTENT_LENGTH, length)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::ETAG, &validators.etag);
    if let Some(last_modified) = validators.last_modified_header() {
        builder = builder.header(header::LAST_MODIFIED, last_modified);
    }
    if let Some(content_range) = content_range {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }

    Ok(builder.body(body).unwrap_or_else(|e| {
        tracing::error!("Failed to build {status} response: {e}");
        http::build_404_response()
    }))
}
