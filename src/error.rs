use std::io;

use axum::http::StatusCode;

/// Errors raised by the synchronous stream types.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream was closed and can no longer be used.
    #[error("the stream has been closed")]
    Closed,

    /// The underlying resource was detached from the stream.
    #[error("the stream has been detached")]
    Detached,

    /// The stream does not support positional access.
    #[error("the stream is not seekable")]
    NotSeekable,

    /// The stream does not accept writes.
    #[error("the stream is not writable")]
    NotWritable,

    /// The stream cannot be read from.
    #[error("the stream is not readable")]
    NotReadable,

    /// An async source was already taken, or the stream never had one.
    #[error("an async stream cannot be created")]
    AsyncUnavailable,

    /// An fopen-style mode string could not be understood.
    #[error("invalid file open mode {0:?}")]
    InvalidMode(String),

    /// Blocking on an async source requires a tokio runtime handle.
    #[error("no tokio runtime is available to drive the async stream")]
    NoRuntime,

    /// The underlying file or reader failed.
    #[error("stream I/O failed")]
    Io(#[from] io::Error),

    /// The wrapped async body failed while being read.
    #[error("an error occurred while reading from the async body")]
    Body(#[source] axum::Error),
}

/// Errors raised while converting between the two message shapes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The inbound body exceeded the configured size limit.
    #[error("request body exceeds the limit of {limit} bytes")]
    BodyTooLarge {
        /// The configured limit.
        limit: usize,
    },

    /// The inbound form carried more fields than allowed.
    #[error("form body contains more than {limit} fields")]
    TooManyFields {
        /// The configured limit.
        limit: usize,
    },

    /// The inbound form body could not be parsed.
    #[error("malformed form body: {0}")]
    MalformedForm(String),

    /// Reading the inbound body failed.
    #[error("failed to read the request body")]
    Body(#[source] axum::Error),

    /// A body stream failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The handler panicked or was cancelled on the blocking pool.
    #[error("the request handler did not complete")]
    Handler(#[source] tokio::task::JoinError),
}

impl Error {
    /// The HTTP status used when this error is turned into a response.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BodyTooLarge { .. } | Error::TooManyFields { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Error::MalformedForm(_) => StatusCode::BAD_REQUEST,
            Error::Body(_) => StatusCode::BAD_REQUEST,
            Error::Stream(_) | Error::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<multer::Error> for Error {
    fn from(err: multer::Error) -> Self {
        Error::MalformedForm(err.to_string())
    }
}
