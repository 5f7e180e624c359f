use std::{
    fmt, io,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll, ready},
};

use futures::{FutureExt, future::BoxFuture};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf},
};

use super::OpenMode;

/// A file that is opened the first time it is read from or written to.
///
/// Errors from opening the file are reported by that first operation.
pub struct DelayedOpenFileStream {
    path: PathBuf,
    state: State,
}

enum State {
    Idle(OpenMode),
    Opening(BoxFuture<'static, io::Result<File>>),
    Open(File),
    Failed,
}

impl fmt::Debug for DelayedOpenFileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Idle(_) => "idle",
            State::Opening(_) => "opening",
            State::Open(_) => "open",
            State::Failed => "failed",
        };
        f.debug_struct("DelayedOpenFileStream")
            .field("path", &self.path)
            .field("state", &state)
            .finish()
    }
}

impl DelayedOpenFileStream {
    pub fn new(path: impl Into<PathBuf>, mode: OpenMode) -> Self {
        DelayedOpenFileStream {
            path: path.into(),
            state: State::Idle(mode),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file has been opened yet.
    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    /// Write `data` and then shut down the write side.
    pub async fn end(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data).await?;
        self.shutdown().await
    }

    fn poll_file(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<&mut File>> {
        loop {
            match &mut self.state {
                State::Idle(mode) => {
                    let options = tokio::fs::OpenOptions::from(mode.options());
                    let path = self.path.clone();
                    tracing::trace!(path = %path.display(), "opening delayed file");
                    self.state = State::Opening(async move { options.open(path).await }.boxed());
                }
                State::Opening(open) => {
                    let result = ready!(open.poll_unpin(cx));
                    match result {
                        Ok(file) => self.state = State::Open(file),
                        Err(err) => {
                            self.state = State::Failed;
                            return Poll::Ready(Err(err));
                        }
                    }
                }
                State::Open(_) => break,
                State::Failed => {
                    return Poll::Ready(Err(io::Error::other("the file could not be opened")));
                }
            }
        }

        match &mut self.state {
            State::Open(file) => Poll::Ready(Ok(file)),
            _ => Poll::Ready(Err(io::Error::other("the file is not open"))),
        }
    }
}

impl AsyncRead for DelayedOpenFileStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let file = ready!(self.get_mut().poll_file(cx))?;
        Pin::new(file).poll_read(cx, buf)
    }
}

impl AsyncWrite for DelayedOpenFileStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let file = ready!(self.get_mut().poll_file(cx))?;
        Pin::new(file).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            State::Open(file) => Pin::new(file).poll_flush(cx),
            _ => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            State::Open(file) => Pin::new(file).poll_shutdown(cx),
            _ => Poll::Ready(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn opens_on_first_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later.txt");

        let mut stream = DelayedOpenFileStream::new(&path, OpenMode::READ);
        assert!(!stream.is_open());

        // Created after construction; only the first read needs it to exist.
        std::fs::write(&path, "delayed contents").unwrap();

        let mut contents = String::new();
        stream.read_to_string(&mut contents).await.unwrap();
        assert!(stream.is_open());
        assert_eq!(contents, "delayed contents");
    }

    #[tokio::test]
    async fn missing_file_fails_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut stream = DelayedOpenFileStream::new(dir.path().join("missing"), OpenMode::READ);

        let mut buf = Vec::new();
        let err = stream.read_to_end(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn end_writes_and_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("written.txt");

        let mut stream = DelayedOpenFileStream::new(&path, "w".parse().unwrap());
        stream.end(b"final").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"final");
    }
}
