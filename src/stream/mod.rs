//! Synchronous body streams and the adapters that move them across the
//! sync/async boundary.

mod adapted_async_stream;
mod async_ready_stream;
mod buffered_body;
mod delayed_open_file_stream;
mod factory;
mod file_stream;
mod mode;

use std::{fmt, io, io::Read, io::SeekFrom, path::PathBuf};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use tokio_util::io::ReaderStream;

use crate::error::StreamError;

pub use adapted_async_stream::AdaptedAsyncStream;
pub use async_ready_stream::{AsyncFactory, AsyncReadyStream};
pub use buffered_body::BufferedBody;
pub use delayed_open_file_stream::DelayedOpenFileStream;
pub use factory::{AsyncReadyStreamFactory, DefaultStreamFactory, StreamFactory};
pub use file_stream::FileStream;
pub use mode::OpenMode;

/// A boxed synchronous body, as carried by requests and responses on the
/// handler side.
pub type MessageBody = Box<dyn MessageStream>;

/// A pending async source handed over by [`MessageStream::take_async`].
pub type AsyncSource = BoxFuture<'static, Result<AsyncStream, StreamError>>;

/// The synchronous body contract seen by request handlers.
///
/// Streams are pull-based: callers ask for up to `length` bytes at a time and
/// check [`eof`](MessageStream::eof) to learn when the data runs out. Streams
/// that know how to hand themselves over to the async runtime override
/// [`take_async`](MessageStream::take_async) so responses can be written without
/// blocking reads.
pub trait MessageStream: Send + fmt::Debug {
    /// Total size in bytes, if known.
    fn size(&mut self) -> Option<u64>;

    /// Current position of the read pointer.
    fn tell(&mut self) -> Result<u64, StreamError>;

    /// Whether the stream is exhausted or no longer usable.
    fn eof(&self) -> bool;

    fn is_seekable(&self) -> bool;

    fn seek(&mut self, pos: SeekFrom) -> Result<(), StreamError>;

    /// Seek back to the start of the stream.
    fn rewind(&mut self) -> Result<(), StreamError> {
        self.seek(SeekFrom::Start(0))
    }

    fn is_writable(&self) -> bool;

    /// Write `data`, returning the number of bytes written.
    fn write(&mut self, data: &[u8]) -> Result<usize, StreamError>;

    fn is_readable(&self) -> bool;

    /// Read up to `length` bytes. Fewer bytes may be returned; an empty chunk
    /// means no data is currently available.
    fn read(&mut self, length: usize) -> Result<Bytes, StreamError>;

    /// Read everything that remains, leaving the stream at eof.
    fn contents(&mut self) -> Result<Bytes, StreamError>;

    /// Close the stream and release its resources.
    fn close(&mut self);

    /// Separate the underlying OS file from the stream, if there is one.
    ///
    /// The stream is unusable afterwards.
    fn detach(&mut self) -> Option<std::fs::File>;

    fn metadata(&self) -> StreamMetadata;

    /// Take the async source backing this stream, if it has one.
    ///
    /// Returns `None` for purely synchronous streams and on every call after
    /// the first.
    fn take_async(&mut self) -> Option<AsyncSource> {
        None
    }
}

/// Descriptive information about a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMetadata {
    /// Kind of backing store, e.g. `"memory"` or `"plainfile"`.
    pub stream_type: &'static str,
    /// Path of the backing file, for file streams.
    pub uri: Option<PathBuf>,
    /// Mode the backing file was opened with.
    pub mode: Option<String>,
    pub seekable: bool,
}

impl StreamMetadata {
    pub(crate) fn new(stream_type: &'static str, seekable: bool) -> Self {
        StreamMetadata {
            stream_type,
            uri: None,
            mode: None,
            seekable,
        }
    }
}

/// An asynchronous byte source that the server runtime can write directly.
pub enum AsyncStream {
    /// A request or response body.
    Body(Body),
    /// An open tokio file, read from its current position.
    File(tokio::fs::File),
    /// A file that is opened on first use.
    Delayed(DelayedOpenFileStream),
    /// A blocking reader, pulled on tokio's blocking pool.
    Reader(Box<dyn Read + Send>),
}

impl fmt::Debug for AsyncStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncStream::Body(_) => f.write_str("AsyncStream::Body"),
            AsyncStream::File(file) => f.debug_tuple("AsyncStream::File").field(file).finish(),
            AsyncStream::Delayed(file) => {
                f.debug_tuple("AsyncStream::Delayed").field(file).finish()
            }
            AsyncStream::Reader(_) => f.write_str("AsyncStream::Reader"),
        }
    }
}

impl From<Bytes> for AsyncStream {
    fn from(bytes: Bytes) -> Self {
        AsyncStream::Body(Body::from(bytes))
    }
}

impl AsyncStream {
    /// Turn the source into a body the server can send, reading files in
    /// `chunk_size` pieces.
    pub fn into_body(self, chunk_size: usize) -> Body {
        match self {
            AsyncStream::Body(body) => body,
            AsyncStream::File(file) => {
                Body::from_stream(ReaderStream::with_capacity(file, chunk_size))
            }
            AsyncStream::Delayed(file) => {
                Body::from_stream(ReaderStream::with_capacity(file, chunk_size))
            }
            AsyncStream::Reader(reader) => reader_body(reader, chunk_size),
        }
    }
}

/// Adapts a [`MessageStream`] to [`std::io::Read`], so a synchronous body can
/// be streamed as an [`AsyncStream::Reader`].
#[derive(Debug)]
pub struct MessageStreamReader {
    stream: MessageBody,
}

impl MessageStreamReader {
    pub fn new(stream: MessageBody) -> Self {
        MessageStreamReader { stream }
    }

    pub fn into_inner(self) -> MessageBody {
        self.stream
    }
}

impl Read for MessageStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        // An empty chunk only means nothing is available yet.
        while !self.stream.eof() {
            let chunk = self.stream.read(buf.len()).map_err(io::Error::other)?;
            if !chunk.is_empty() {
                let len = chunk.len().min(buf.len());
                buf[..len].copy_from_slice(&chunk[..len]);
                return Ok(len);
            }
        }
        Ok(0)
    }
}

fn read_chunk(reader: &mut dyn Read, length: usize) -> Result<Option<Bytes>, StreamError> {
    let mut buf = BytesMut::zeroed(length);
    let read = loop {
        match reader.read(&mut buf) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            other => break other?,
        }
    };
    if read == 0 {
        return Ok(None);
    }
    buf.truncate(read);
    Ok(Some(buf.freeze()))
}

/// Build a body that pulls `chunk_size` reads from a blocking reader on
/// tokio's blocking pool until the reader is exhausted.
fn reader_body(reader: Box<dyn Read + Send>, chunk_size: usize) -> Body {
    let stream = futures::stream::try_unfold(reader, move |mut reader| async move {
        let (reader, chunk) = tokio::task::spawn_blocking(move || {
            let chunk = read_chunk(&mut reader, chunk_size);
            (reader, chunk)
        })
        .await
        .map_err(|err| StreamError::Io(io::Error::other(err)))?;

        Ok::<_, StreamError>(chunk?.map(|chunk| (chunk, reader)))
    });

    Body::from_stream(stream)
}
