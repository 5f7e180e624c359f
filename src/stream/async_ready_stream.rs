use std::{fmt, io::SeekFrom};

use bytes::Bytes;

use super::{AsyncSource, MessageBody, MessageStream, StreamMetadata};
use crate::error::StreamError;

/// Builds the async source for an [`AsyncReadyStream`] out of its decorated
/// stream. Runs at most once.
pub type AsyncFactory = Box<dyn FnOnce(MessageBody) -> AsyncSource + Send>;

/// A synchronous stream that also knows how to become an async one.
///
/// All [`MessageStream`] calls go to the decorated stream. When the response
/// is converted the factory takes the decorated stream over instead, so the
/// body is written without blocking reads, and this stream is left detached.
/// Closing, detaching or draining the stream gives up the factory.
pub struct AsyncReadyStream {
    decorated: Option<MessageBody>,
    factory: Option<AsyncFactory>,
}

impl fmt::Debug for AsyncReadyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncReadyStream")
            .field("decorated", &self.decorated)
            .field("async_ready", &self.factory.is_some())
            .finish()
    }
}

impl AsyncReadyStream {
    pub fn new<F>(stream: MessageBody, factory: F) -> Self
    where
        F: FnOnce(MessageBody) -> AsyncSource + Send + 'static,
    {
        AsyncReadyStream {
            decorated: Some(stream),
            factory: Some(Box::new(factory)),
        }
    }

    /// Whether [`create_async_stream`](Self::create_async_stream) can still
    /// succeed.
    pub fn is_async_ready(&self) -> bool {
        self.factory.is_some() && self.decorated.is_some()
    }

    /// Hand the decorated stream to the factory.
    ///
    /// Fails with [`StreamError::AsyncUnavailable`] once the factory has been
    /// used or discarded.
    pub fn create_async_stream(&mut self) -> Result<AsyncSource, StreamError> {
        let factory = self.factory.take().ok_or(StreamError::AsyncUnavailable)?;
        let decorated = self.decorated.take().ok_or(StreamError::AsyncUnavailable)?;
        Ok(factory(decorated))
    }

    fn decorated(&mut self) -> Result<&mut MessageBody, StreamError> {
        self.decorated.as_mut().ok_or(StreamError::Detached)
    }
}

impl MessageStream for AsyncReadyStream {
    fn size(&mut self) -> Option<u64> {
        self.decorated.as_mut()?.size()
    }

    fn tell(&mut self) -> Result<u64, StreamError> {
        self.decorated()?.tell()
    }

    fn eof(&self) -> bool {
        self.decorated.as_ref().is_none_or(|stream| stream.eof())
    }

    fn is_seekable(&self) -> bool {
        self.decorated
            .as_ref()
            .is_some_and(|stream| stream.is_seekable())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<(), StreamError> {
        self.decorated()?.seek(pos)
    }

    fn rewind(&mut self) -> Result<(), StreamError> {
        self.decorated()?.rewind()
    }

    fn is_writable(&self) -> bool {
        self.decorated
            .as_ref()
            .is_some_and(|stream| stream.is_writable())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        self.decorated()?.write(data)
    }

    fn is_readable(&self) -> bool {
        self.decorated
            .as_ref()
            .is_some_and(|stream| stream.is_readable())
    }

    fn read(&mut self, length: usize) -> Result<Bytes, StreamError> {
        self.decorated()?.read(length)
    }

    fn contents(&mut self) -> Result<Bytes, StreamError> {
        self.factory = None;
        self.decorated()?.contents()
    }

    fn close(&mut self) {
        if let Some(stream) = self.decorated.as_mut() {
            stream.close();
        }
        self.factory = None;
    }

    fn detach(&mut self) -> Option<std::fs::File> {
        self.factory = None;
        self.decorated.as_mut()?.detach()
    }

    fn metadata(&self) -> StreamMetadata {
        match &self.decorated {
            Some(stream) => stream.metadata(),
            None => StreamMetadata::new("detached", false),
        }
    }

    fn take_async(&mut self) -> Option<AsyncSource> {
        self.create_async_stream().ok()
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;
    use crate::stream::{AsyncStream, BufferedBody};

    fn in_memory(content: &'static str) -> AsyncReadyStream {
        AsyncReadyStream::new(Box::new(BufferedBody::new(content)), |mut stream| {
            futures::future::ready(stream.contents().map(AsyncStream::from)).boxed()
        })
    }

    #[test]
    fn delegates_reads() {
        let mut stream = in_memory("delegated");

        assert_eq!(stream.size(), Some(9));
        assert_eq!(stream.read(4).unwrap(), "dele");
        assert_eq!(stream.tell().unwrap(), 4);
        assert!(stream.is_async_ready());
    }

    #[test]
    fn factory_runs_once() {
        let mut stream = in_memory("once");

        assert!(stream.create_async_stream().is_ok());
        assert!(!stream.is_async_ready());
        assert!(stream.eof());
        assert!(matches!(stream.read(1), Err(StreamError::Detached)));
        assert!(matches!(
            stream.create_async_stream(),
            Err(StreamError::AsyncUnavailable)
        ));
        assert!(stream.take_async().is_none());
    }

    #[test]
    fn close_discards_factory() {
        let mut stream = in_memory("closed");
        stream.close();

        assert!(!stream.is_async_ready());
        assert!(!stream.is_readable());
    }

    #[test]
    fn contents_discards_factory() {
        let mut stream = in_memory("drained");
        assert_eq!(stream.contents().unwrap(), "drained");
        assert!(stream.take_async().is_none());
    }

    #[test]
    fn detach_discards_factory() {
        let mut stream = in_memory("detached");
        assert!(stream.detach().is_none());

        assert!(!stream.is_async_ready());
        assert!(matches!(
            stream.create_async_stream(),
            Err(StreamError::AsyncUnavailable)
        ));
        assert!(stream.take_async().is_none());
    }
}
