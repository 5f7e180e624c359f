use std::io::SeekFrom;

use bytes::Bytes;

use super::{MessageStream, StreamMetadata};
use crate::error::StreamError;

/// A read-only stream over an in-memory buffer.
///
/// Seeks are clamped to the buffer bounds instead of failing.
#[derive(Debug, Clone)]
pub struct BufferedBody {
    buffer: Option<Bytes>,
    position: usize,
}

impl BufferedBody {
    pub fn new(buffer: impl Into<Bytes>) -> Self {
        BufferedBody {
            buffer: Some(buffer.into()),
            position: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    fn buffer(&self) -> Result<&Bytes, StreamError> {
        self.buffer.as_ref().ok_or(StreamError::Closed)
    }
}

impl Default for BufferedBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl MessageStream for BufferedBody {
    fn size(&mut self) -> Option<u64> {
        self.buffer.as_ref().map(|buffer| buffer.len() as u64)
    }

    fn tell(&mut self) -> Result<u64, StreamError> {
        Ok(self.position as u64)
    }

    fn eof(&self) -> bool {
        self.buffer
            .as_ref()
            .is_none_or(|buffer| self.position >= buffer.len())
    }

    fn is_seekable(&self) -> bool {
        self.is_readable()
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<(), StreamError> {
        let length = self.buffer()?.len() as i128;
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(offset) => self.position as i128 + i128::from(offset),
            SeekFrom::End(offset) => length + i128::from(offset),
        };
        self.position = target.clamp(0, length) as usize;
        Ok(())
    }

    fn is_writable(&self) -> bool {
        false
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize, StreamError> {
        Err(StreamError::NotWritable)
    }

    fn is_readable(&self) -> bool {
        self.buffer.is_some()
    }

    fn read(&mut self, length: usize) -> Result<Bytes, StreamError> {
        let buffer = self.buffer()?;
        let start = self.position.min(buffer.len());
        let end = start.saturating_add(length).min(buffer.len());
        let chunk = buffer.slice(start..end);
        self.position = end;
        Ok(chunk)
    }

    fn contents(&mut self) -> Result<Bytes, StreamError> {
        let buffer = self.buffer()?;
        let start = self.position.min(buffer.len());
        let rest = buffer.slice(start..);
        self.position = buffer.len();
        Ok(rest)
    }

    fn close(&mut self) {
        self.buffer = None;
    }

    fn detach(&mut self) -> Option<std::fs::File> {
        self.buffer = None;
        None
    }

    fn metadata(&self) -> StreamMetadata {
        StreamMetadata::new("memory", self.is_seekable())
    }
}
