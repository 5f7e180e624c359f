use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;

use super::{MessageStream, OpenMode, StreamMetadata};
use crate::error::StreamError;

/// A blocking stream over a file on disk.
#[derive(Debug)]
pub struct FileStream {
    file: Option<File>,
    path: Option<PathBuf>,
    mode: Option<OpenMode>,
    eof: bool,
}

impl FileStream {
    /// Open `path` with an fopen-style `mode`.
    pub fn open(path: impl AsRef<Path>, mode: &str) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let mode: OpenMode = mode.parse()?;
        let file = mode.options().open(path)?;

        Ok(FileStream {
            file: Some(file),
            path: Some(path.to_owned()),
            mode: Some(mode),
            eof: false,
        })
    }

    /// Wrap an already open file. Its current position is kept.
    pub fn from_file(file: File) -> Self {
        FileStream {
            file: Some(file),
            path: None,
            mode: None,
            eof: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn mode(&self) -> Option<OpenMode> {
        self.mode
    }

    fn file(&mut self) -> Result<&mut File, StreamError> {
        self.file.as_mut().ok_or(StreamError::Closed)
    }

    fn unreadable(&self) -> StreamError {
        match self.file {
            Some(_) => StreamError::NotReadable,
            None => StreamError::Closed,
        }
    }
}

impl MessageStream for FileStream {
    fn size(&mut self) -> Option<u64> {
        self.file
            .as_ref()
            .and_then(|file| file.metadata().ok())
            .map(|metadata| metadata.len())
    }

    fn tell(&mut self) -> Result<u64, StreamError> {
        Ok(self.file()?.stream_position()?)
    }

    fn eof(&self) -> bool {
        self.file.is_none() || self.eof
    }

    fn is_seekable(&self) -> bool {
        self.file.is_some()
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<(), StreamError> {
        self.file()?.seek(pos)?;
        self.eof = false;
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.file.is_some() && self.mode.is_none_or(|mode| mode.is_writable())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        if !self.is_writable() {
            return Err(StreamError::NotWritable);
        }
        Ok(self.file()?.write(data)?)
    }

    fn is_readable(&self) -> bool {
        self.file.is_some() && self.mode.is_none_or(|mode| mode.is_readable())
    }

    fn read(&mut self, length: usize) -> Result<Bytes, StreamError> {
        if !self.is_readable() {
            return Err(self.unreadable());
        }

        let mut buf = Vec::new();
        let limit = u64::try_from(length).unwrap_or(u64::MAX);
        self.file()?.take(limit).read_to_end(&mut buf)?;
        if buf.len() < length {
            self.eof = true;
        }
        Ok(buf.into())
    }

    fn contents(&mut self) -> Result<Bytes, StreamError> {
        if !self.is_readable() {
            return Err(self.unreadable());
        }

        let mut buf = Vec::new();
        self.file()?.read_to_end(&mut buf)?;
        self.eof = true;
        Ok(buf.into())
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn detach(&mut self) -> Option<File> {
        self.file.take()
    }

    fn metadata(&self) -> StreamMetadata {
        StreamMetadata {
            stream_type: "plainfile",
            uri: self.path.clone(),
            mode: self.mode.map(|mode| mode.to_string()),
            seekable: self.is_seekable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_until_eof() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();

        let mut stream = FileStream::open(tmp.path(), "r").unwrap();
        assert_eq!(stream.size(), Some(10));
        assert!(!stream.is_writable());

        assert_eq!(stream.read(4).unwrap(), "0123");
        assert!(!stream.eof());
        assert_eq!(stream.read(100).unwrap(), "456789");
        assert!(stream.eof());

        stream.seek(SeekFrom::Start(8)).unwrap();
        assert!(!stream.eof());
        assert_eq!(stream.contents().unwrap(), "89");
    }

    #[test]
    fn detach_hands_over_position() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"abcdef").unwrap();

        let mut stream = FileStream::open(tmp.path(), "rb").unwrap();
        stream.read(2).unwrap();

        let mut file = stream.detach().unwrap();
        assert!(stream.eof());
        assert!(matches!(stream.read(1), Err(StreamError::Closed)));

        let mut rest = String::new();
        file.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "cdef");
    }

    #[test]
    fn writes_in_write_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let mut stream = FileStream::open(&path, "w").unwrap();
        assert!(!stream.is_readable());
        assert_eq!(stream.write(b"hello").unwrap(), 5);
        stream.close();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert_eq!(stream.metadata().mode.as_deref(), Some("w"));
    }

    #[test]
    fn write_only_stream_is_not_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let mut stream = FileStream::open(&path, "w").unwrap();
        assert!(matches!(stream.read(4), Err(StreamError::NotReadable)));
        assert!(matches!(stream.contents(), Err(StreamError::NotReadable)));

        stream.close();
        assert!(matches!(stream.read(4), Err(StreamError::Closed)));
    }

    #[test]
    fn oversized_reads_return_what_is_there() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();

        let mut stream = FileStream::open(tmp.path(), "r").unwrap();
        assert_eq!(stream.read(usize::MAX).unwrap(), "0123456789");
        assert!(stream.eof());

        stream.rewind().unwrap();
        assert_eq!(stream.read(1 << 30).unwrap(), "0123456789");
    }
}
