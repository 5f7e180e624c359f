use std::{
    fs::File,
    io::{Read, SeekFrom},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use futures::{FutureExt, future};
use tokio::io::AsyncSeekExt;

use super::{
    AdaptedAsyncStream, AsyncReadyStream, AsyncSource, AsyncStream, BufferedBody,
    DelayedOpenFileStream, FileStream, MessageBody, MessageStreamReader, OpenMode,
};
use crate::error::StreamError;

/// Creates the synchronous streams handlers put into responses.
pub trait StreamFactory: Send + Sync {
    /// A stream over `content`.
    fn create_stream(&self, content: Bytes) -> MessageBody;

    /// A stream over the file at `path`, opened with an fopen-style `mode`.
    fn create_stream_from_file(&self, path: &Path, mode: &str) -> Result<MessageBody, StreamError>;

    /// A stream over an already open file, starting at its current position.
    fn create_stream_from_handle(&self, file: File) -> MessageBody;

    /// A stream over an arbitrary reader.
    fn create_stream_from_reader(
        &self,
        reader: Box<dyn Read + Send>,
    ) -> Result<MessageBody, StreamError>;
}

/// Builds [`BufferedBody`] and [`FileStream`] streams.
///
/// Readers are wrapped in a forward-only [`AdaptedAsyncStream`] and only read
/// as the stream is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStreamFactory;

impl StreamFactory for DefaultStreamFactory {
    fn create_stream(&self, content: Bytes) -> MessageBody {
        Box::new(BufferedBody::new(content))
    }

    fn create_stream_from_file(&self, path: &Path, mode: &str) -> Result<MessageBody, StreamError> {
        Ok(Box::new(FileStream::open(path, mode)?))
    }

    fn create_stream_from_handle(&self, file: File) -> MessageBody {
        Box::new(FileStream::from_file(file))
    }

    fn create_stream_from_reader(
        &self,
        reader: Box<dyn Read + Send>,
    ) -> Result<MessageBody, StreamError> {
        Ok(Box::new(AdaptedAsyncStream::new(AsyncStream::Reader(reader))))
    }
}

/// Wraps another factory so every stream it creates is an
/// [`AsyncReadyStream`].
///
/// Responses built from these streams are written by the async runtime
/// directly: in-memory content is handed over as a buffer, files are re-opened
/// (or their handles moved) as tokio files, and anything else is read on the
/// blocking pool.
///
/// ```rust
/// use syncbridge::{AsyncReadyStreamFactory, DefaultStreamFactory, StreamFactory};
///
/// let factory = AsyncReadyStreamFactory::new(DefaultStreamFactory);
/// let body = factory.create_stream("Hello, World!".into());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AsyncReadyStreamFactory<F = DefaultStreamFactory> {
    decorated: F,
}

impl<F> AsyncReadyStreamFactory<F>
where
    F: StreamFactory,
{
    pub fn new(factory: F) -> Self {
        AsyncReadyStreamFactory { decorated: factory }
    }

    pub fn get_ref(&self) -> &F {
        &self.decorated
    }
}

impl<F> StreamFactory for AsyncReadyStreamFactory<F>
where
    F: StreamFactory,
{
    fn create_stream(&self, content: Bytes) -> MessageBody {
        Box::new(AsyncReadyStream::new(
            self.decorated.create_stream(content),
            buffered_source,
        ))
    }

    fn create_stream_from_file(&self, path: &Path, mode: &str) -> Result<MessageBody, StreamError> {
        let stream = self.decorated.create_stream_from_file(path, mode)?;
        let read_only = mode.parse::<OpenMode>().is_ok_and(|mode| mode.is_read_only());
        let path = path.to_owned();
        Ok(Box::new(AsyncReadyStream::new(stream, move |stream| {
            reopened_file_source(stream, path, read_only)
        })))
    }

    fn create_stream_from_handle(&self, file: File) -> MessageBody {
        Box::new(AsyncReadyStream::new(
            self.decorated.create_stream_from_handle(file),
            resource_source,
        ))
    }

    fn create_stream_from_reader(
        &self,
        reader: Box<dyn Read + Send>,
    ) -> Result<MessageBody, StreamError> {
        Ok(Box::new(AsyncReadyStream::new(
            self.decorated.create_stream_from_reader(reader)?,
            resource_source,
        )))
    }
}

/// The remaining contents, handed over as one buffer.
fn buffered_source(mut stream: MessageBody) -> AsyncSource {
    let contents = stream.contents();
    stream.detach();
    future::ready(contents.map(AsyncStream::from)).boxed()
}

/// Hand a file stream over to the runtime.
///
/// An untouched read-only file is re-opened lazily from `path`. Otherwise the
/// detached handle is used with its position intact, or `path` is re-opened
/// and seeked when the handle cannot be read from.
fn reopened_file_source(mut stream: MessageBody, path: PathBuf, read_only: bool) -> AsyncSource {
    let position = stream.tell().unwrap_or(0);
    let readable = stream.is_readable();

    if read_only && position == 0 {
        stream.close();
        return future::ready(Ok(AsyncStream::Delayed(DelayedOpenFileStream::new(
            path,
            OpenMode::READ,
        ))))
        .boxed();
    }

    match stream.detach() {
        Some(file) if readable => {
            future::ready(Ok(AsyncStream::File(tokio::fs::File::from_std(file)))).boxed()
        }
        _ => async move {
            let mut file = tokio::fs::OpenOptions::from(OpenMode::READ.options())
                .open(&path)
                .await?;
            file.seek(SeekFrom::Start(position)).await?;
            Ok::<_, StreamError>(AsyncStream::File(file))
        }
        .boxed(),
    }
}

/// Pick a source based on what backs the stream.
fn resource_source(mut stream: MessageBody) -> AsyncSource {
    match stream.metadata().stream_type {
        "memory" => buffered_source(stream),
        "plainfile" => match stream.detach() {
            Some(file) => {
                future::ready(Ok(AsyncStream::File(tokio::fs::File::from_std(file)))).boxed()
            }
            None => future::ready(Err(StreamError::Detached)).boxed(),
        },
        _ => match stream.take_async() {
            Some(source) => source,
            None => future::ready(Ok(AsyncStream::Reader(Box::new(MessageStreamReader::new(
                stream,
            )))))
            .boxed(),
        },
    }
}
