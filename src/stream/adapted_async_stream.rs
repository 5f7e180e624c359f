use std::io::{Read, SeekFrom};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use http_body_util::BodyExt;
use tokio::{
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    runtime::Handle,
};

use super::{AsyncSource, AsyncStream, MessageStream, StreamMetadata};
use crate::error::StreamError;

/// Largest chunk pulled from the source by a single read.
const MAX_READ_CHUNK: usize = 64 * 1024;

/// Presents an async source through the blocking [`MessageStream`] contract.
///
/// Every operation blocks on the tokio runtime that was current when the
/// stream was created, so it must only be used from a blocking context such
/// as [`tokio::task::spawn_blocking`]. Handlers run by
/// [`RequestHandlerBridge`](crate::RequestHandlerBridge) already are.
///
/// Positional operations are only available when the source is a file.
#[derive(Debug)]
pub struct AdaptedAsyncStream {
    stream: Option<AsyncStream>,
    handle: Option<Handle>,
    buffer: Option<Bytes>,
    eof: bool,
}

impl AdaptedAsyncStream {
    pub fn new(stream: AsyncStream) -> Self {
        AdaptedAsyncStream {
            stream: Some(stream),
            handle: Handle::try_current().ok(),
            buffer: None,
            eof: false,
        }
    }

    /// Use `handle` to drive the source instead of the runtime captured at
    /// construction.
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Return the wrapped source and leave this stream unusable, like
    /// [`detach`](MessageStream::detach).
    pub fn extract_async_stream(&mut self) -> Option<AsyncStream> {
        self.eof = true;
        self.buffer = None;
        self.stream.take()
    }

    fn file(&mut self) -> Result<&mut tokio::fs::File, StreamError> {
        match self.stream.as_mut() {
            Some(AsyncStream::File(file)) => Ok(file),
            Some(_) => Err(StreamError::NotSeekable),
            None => Err(StreamError::Detached),
        }
    }

    fn is_file(&self) -> bool {
        matches!(self.stream, Some(AsyncStream::File(_)))
    }

    /// Pull the next chunk from the source, `None` once it is exhausted.
    fn next_chunk(&mut self, length: usize) -> Result<Option<Bytes>, StreamError> {
        let length = length.min(MAX_READ_CHUNK);
        let handle = self.handle.clone();
        let stream = self.stream.as_mut().ok_or(StreamError::Detached)?;

        match stream {
            AsyncStream::Body(body) => handle
                .ok_or(StreamError::NoRuntime)?
                .block_on(next_data_frame(body)),
            AsyncStream::File(file) => {
                let handle = handle.ok_or(StreamError::NoRuntime)?;
                let mut buf = BytesMut::with_capacity(length);
                let read = handle.block_on(file.read_buf(&mut buf))?;
                Ok((read > 0).then(|| buf.freeze()))
            }
            AsyncStream::Delayed(file) => {
                let handle = handle.ok_or(StreamError::NoRuntime)?;
                let mut buf = BytesMut::with_capacity(length);
                let read = handle.block_on(file.read_buf(&mut buf))?;
                Ok((read > 0).then(|| buf.freeze()))
            }
            AsyncStream::Reader(reader) => super::read_chunk(reader.as_mut(), length),
        }
    }

    fn fail<T>(&mut self, err: StreamError) -> Result<T, StreamError> {
        self.eof = true;
        Err(err)
    }
}

async fn next_data_frame(body: &mut Body) -> Result<Option<Bytes>, StreamError> {
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(StreamError::Body)?;
        if let Ok(data) = frame.into_data() {
            return Ok(Some(data));
        }
    }
    Ok(None)
}

impl MessageStream for AdaptedAsyncStream {
    fn size(&mut self) -> Option<u64> {
        let handle = self.handle.clone()?;
        let file = self.file().ok()?;
        match handle.block_on(file.metadata()) {
            Ok(metadata) => Some(metadata.len()),
            Err(err) => {
                tracing::debug!(%err, "could not read the size of the async file");
                None
            }
        }
    }

    fn tell(&mut self) -> Result<u64, StreamError> {
        let handle = self.handle.clone().ok_or(StreamError::NoRuntime)?;
        let buffered = self.buffer.as_ref().map_or(0, |buffer| buffer.len() as u64);
        let position = handle.block_on(self.file()?.stream_position())?;
        Ok(position.saturating_sub(buffered))
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn is_seekable(&self) -> bool {
        self.is_file() && !self.eof
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<(), StreamError> {
        let handle = self.handle.clone().ok_or(StreamError::NoRuntime)?;
        let file = self.file()?;
        match handle.block_on(file.seek(pos)) {
            Ok(_) => {
                self.buffer = None;
                Ok(())
            }
            Err(err) => self.fail(err.into()),
        }
    }

    fn rewind(&mut self) -> Result<(), StreamError> {
        Err(StreamError::NotSeekable)
    }

    fn is_writable(&self) -> bool {
        matches!(
            self.stream,
            Some(AsyncStream::File(_) | AsyncStream::Delayed(_))
        ) && !self.eof
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        if self.eof {
            return Err(StreamError::Closed);
        }

        let handle = self.handle.clone().ok_or(StreamError::NoRuntime)?;
        let result = match self.stream.as_mut() {
            Some(AsyncStream::File(file)) => handle.block_on(file.write_all(data)),
            Some(AsyncStream::Delayed(file)) => handle.block_on(file.write_all(data)),
            _ => return Err(StreamError::NotWritable),
        };

        match result {
            Ok(()) => Ok(data.len()),
            Err(err) => self.fail(err.into()),
        }
    }

    fn is_readable(&self) -> bool {
        !self.eof
    }

    fn read(&mut self, length: usize) -> Result<Bytes, StreamError> {
        if self.eof {
            return Err(StreamError::Closed);
        }
        if length == 0 {
            return Ok(Bytes::new());
        }

        let mut chunk = match self.buffer.take() {
            Some(buffered) => buffered,
            None => match self.next_chunk(length) {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    self.eof = true;
                    Bytes::new()
                }
                Err(err) => return self.fail(err),
            },
        };

        if chunk.len() > length {
            self.buffer = Some(chunk.split_off(length));
        }

        Ok(chunk)
    }

    fn contents(&mut self) -> Result<Bytes, StreamError> {
        let handle = self.handle.clone();
        let runtime = || handle.clone().ok_or(StreamError::NoRuntime);
        let buffered = self.buffer.take();
        let stream = self.stream.take();
        self.eof = true;

        let mut contents = BytesMut::new();
        if let Some(buffered) = buffered {
            contents.extend_from_slice(&buffered);
        }

        let rest = match stream {
            Some(AsyncStream::Body(body)) => runtime()?
                .block_on(body.collect())
                .map(|collected| collected.to_bytes())
                .map_err(StreamError::Body)?,
            Some(AsyncStream::File(mut file)) => {
                let mut buf = Vec::new();
                runtime()?.block_on(file.read_to_end(&mut buf))?;
                buf.into()
            }
            Some(AsyncStream::Delayed(mut file)) => {
                let mut buf = Vec::new();
                runtime()?.block_on(file.read_to_end(&mut buf))?;
                buf.into()
            }
            Some(AsyncStream::Reader(mut reader)) => {
                let mut buf = Vec::new();
                Read::read_to_end(&mut reader, &mut buf)?;
                Bytes::from(buf)
            }
            None => return Err(StreamError::Detached),
        };

        contents.extend_from_slice(&rest);
        Ok(contents.freeze())
    }

    fn close(&mut self) {
        self.eof = true;
        self.buffer = None;
        self.stream = None;
    }

    fn detach(&mut self) -> Option<std::fs::File> {
        self.eof = true;
        self.buffer = None;
        match self.stream.take() {
            Some(AsyncStream::File(file)) => {
                let handle = self.handle.as_ref()?;
                Some(handle.block_on(file.into_std()))
            }
            _ => None,
        }
    }

    fn metadata(&self) -> StreamMetadata {
        let stream_type = match self.stream {
            Some(AsyncStream::File(_) | AsyncStream::Delayed(_)) => "plainfile",
            Some(AsyncStream::Body(_)) => "body",
            Some(AsyncStream::Reader(_)) => "reader",
            None => "detached",
        };
        StreamMetadata::new(stream_type, self.is_seekable())
    }

    fn take_async(&mut self) -> Option<AsyncSource> {
        let stream = self.extract_async_stream()?;
        Some(futures::future::ready(Ok(stream)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn reads_body_in_requested_lengths() {
        let mut stream = AdaptedAsyncStream::new(AsyncStream::Body(Body::from("hello world")));

        let chunks = tokio::task::spawn_blocking(move || {
            let mut chunks = Vec::new();
            while !stream.eof() {
                let chunk = stream.read(5).unwrap();
                if !chunk.is_empty() {
                    chunks.push(chunk);
                }
            }
            chunks
        })
        .await
        .unwrap();

        assert_eq!(chunks, ["hello", " worl", "d"]);
    }

    #[tokio::test]
    async fn contents_include_buffered_data() {
        let mut stream = AdaptedAsyncStream::new(AsyncStream::Body(Body::from("hello")));

        let (head, rest) = tokio::task::spawn_blocking(move || {
            let head = stream.read(2).unwrap();
            (head, stream.contents().unwrap())
        })
        .await
        .unwrap();

        assert_eq!(head, "he");
        assert_eq!(rest, "llo");
    }

    #[tokio::test]
    async fn file_source_supports_positional_access() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        let file = tokio::fs::File::open(tmp.path()).await.unwrap();
        let mut stream = AdaptedAsyncStream::new(AsyncStream::File(file));

        tokio::task::spawn_blocking(move || {
            assert_eq!(stream.size(), Some(10));
            assert!(stream.is_seekable());
            stream.seek(SeekFrom::Start(6)).unwrap();
            assert_eq!(stream.read(2).unwrap(), "67");
            assert_eq!(stream.tell().unwrap(), 8);
            assert!(stream.rewind().is_err());
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn body_source_is_forward_only() {
        let mut stream = AdaptedAsyncStream::new(AsyncStream::from(Bytes::from_static(b"abc")));

        assert!(!stream.is_seekable());
        assert!(!stream.is_writable());
        assert!(matches!(
            stream.seek(SeekFrom::Start(0)),
            Err(StreamError::NotSeekable)
        ));
        assert_eq!(stream.metadata().stream_type, "body");

        assert!(stream.take_async().is_some());
        assert!(stream.take_async().is_none());
        assert!(stream.eof());
    }

    #[test]
    fn blocking_reads_need_a_runtime() {
        let mut stream = AdaptedAsyncStream::new(AsyncStream::from(Bytes::from_static(b"abc")));

        assert!(matches!(stream.read(1), Err(StreamError::NoRuntime)));
        assert!(stream.eof());
    }
}
