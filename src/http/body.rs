//! Response body types
//!
//! Every stage of the pipeline passes `Response<ResponseBody>`. Canned
//! responses use an in-memory body; files are streamed from disk in chunks so
//! a multi-gigabyte asset never sits in memory.

use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use std::io;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// Chunk size used when streaming from disk
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Body type shared by all response builders
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// In-memory body
pub fn full(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Body that yields `reader` in `STREAM_CHUNK_SIZE` chunks until EOF
pub fn stream<R>(reader: R) -> ResponseBody
where
    R: AsyncRead + Send + 'static,
{
    let frames = ReaderStream::with_capacity(reader, STREAM_CHUNK_SIZE).map_ok(Frame::data);
    StreamBody::new(frames).boxed_unsync()
}
