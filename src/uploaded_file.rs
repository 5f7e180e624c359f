use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use bytes::Bytes;

use crate::{
    error::StreamError,
    stream::{BufferedBody, FileStream, MessageBody},
};

/// A file received as part of a multipart form.
pub trait UploadedFile: Send + fmt::Debug {
    /// A stream over the file contents.
    fn stream(&self) -> Result<MessageBody, StreamError>;

    /// Move the file to `target`. Only possible once.
    fn move_to(&mut self, target: &Path) -> Result<(), StreamError>;

    fn size(&self) -> Option<u64>;

    /// Name of the form field the file was sent under.
    fn field_name(&self) -> &str;

    /// File name as sent by the client.
    fn client_filename(&self) -> Option<&str>;

    /// Media type as sent by the client.
    fn client_media_type(&self) -> Option<&str>;
}

/// Metadata the client sent along with the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadInfo {
    pub field_name: String,
    pub filename: Option<String>,
    pub media_type: Option<String>,
}

/// An uploaded file held in memory.
#[derive(Debug)]
pub struct BufferedUploadedFile {
    info: UploadInfo,
    contents: Bytes,
    moved: bool,
}

impl BufferedUploadedFile {
    pub fn new(info: UploadInfo, contents: Bytes) -> Self {
        BufferedUploadedFile {
            info,
            contents,
            moved: false,
        }
    }
}

impl UploadedFile for BufferedUploadedFile {
    fn stream(&self) -> Result<MessageBody, StreamError> {
        if self.moved {
            return Err(StreamError::Detached);
        }
        Ok(Box::new(BufferedBody::new(self.contents.clone())))
    }

    fn move_to(&mut self, target: &Path) -> Result<(), StreamError> {
        if self.moved {
            return Err(StreamError::Detached);
        }
        fs::write(target, &self.contents)?;
        self.moved = true;
        Ok(())
    }

    fn size(&self) -> Option<u64> {
        Some(self.contents.len() as u64)
    }

    fn field_name(&self) -> &str {
        &self.info.field_name
    }

    fn client_filename(&self) -> Option<&str> {
        self.info.filename.as_deref()
    }

    fn client_media_type(&self) -> Option<&str> {
        self.info.media_type.as_deref()
    }
}

/// An uploaded file spooled to a temporary file.
///
/// The temporary file is removed on drop unless it was moved away.
#[derive(Debug)]
pub struct TempUploadedFile {
    info: UploadInfo,
    path: PathBuf,
    size: u64,
    moved: bool,
}

impl TempUploadedFile {
    /// Write `contents` to a new file in `dir`.
    pub async fn spool(info: UploadInfo, contents: Bytes, dir: &Path) -> io::Result<Self> {
        let dir = dir.to_owned();
        let size = contents.len() as u64;

        let path = tokio::task::spawn_blocking(move || -> io::Result<PathBuf> {
            let mut file = tempfile::Builder::new().prefix("upload-").tempfile_in(dir)?;
            io::Write::write_all(&mut file, &contents)?;
            let (_, path) = file.keep().map_err(|err| err.error)?;
            Ok(path)
        })
        .await
        .map_err(io::Error::other)??;

        tracing::trace!(path = %path.display(), size, "spooled uploaded file");

        Ok(TempUploadedFile {
            info,
            path,
            size,
            moved: false,
        })
    }

    /// Where the contents currently live.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UploadedFile for TempUploadedFile {
    fn stream(&self) -> Result<MessageBody, StreamError> {
        if self.moved {
            return Err(StreamError::Detached);
        }
        Ok(Box::new(FileStream::open(&self.path, "r")?))
    }

    fn move_to(&mut self, target: &Path) -> Result<(), StreamError> {
        if self.moved {
            return Err(StreamError::Detached);
        }
        if fs::rename(&self.path, target).is_err() {
            // Likely a different filesystem.
            fs::copy(&self.path, target)?;
            fs::remove_file(&self.path)?;
        }
        self.path = target.to_owned();
        self.moved = true;
        Ok(())
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn field_name(&self) -> &str {
        &self.info.field_name
    }

    fn client_filename(&self) -> Option<&str> {
        self.info.filename.as_deref()
    }

    fn client_media_type(&self) -> Option<&str> {
        self.info.media_type.as_deref()
    }
}

impl Drop for TempUploadedFile {
    fn drop(&mut self) {
        if !self.moved {
            if let Err(err) = fs::remove_file(&self.path) {
                tracing::debug!(path = %self.path.display(), %err, "could not remove spooled upload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> UploadInfo {
        UploadInfo {
            field_name: "avatar".into(),
            filename: Some("me.png".into()),
            media_type: Some("image/png".into()),
        }
    }

    #[test]
    fn buffered_file_moves_once() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("moved.png");
        let mut file = BufferedUploadedFile::new(info(), Bytes::from_static(b"png"));

        assert_eq!(file.size(), Some(3));
        assert_eq!(file.client_filename(), Some("me.png"));
        assert_eq!(file.stream().unwrap().contents().unwrap(), "png");

        file.move_to(&target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"png");
        assert!(file.move_to(&target).is_err());
        assert!(file.stream().is_err());
    }

    #[tokio::test]
    async fn temp_file_is_removed_unless_moved() {
        let dir = tempfile::tempdir().unwrap();

        let file = TempUploadedFile::spool(info(), Bytes::from_static(b"tmp"), dir.path())
            .await
            .unwrap();
        let path = file.path().to_owned();
        assert_eq!(fs::read(&path).unwrap(), b"tmp");
        drop(file);
        assert!(!path.exists());

        let mut file = TempUploadedFile::spool(info(), Bytes::from_static(b"kept"), dir.path())
            .await
            .unwrap();
        let target = dir.path().join("kept.png");
        file.move_to(&target).unwrap();
        drop(file);
        assert_eq!(fs::read(&target).unwrap(), b"kept");
    }
}
