//! Run synchronous, buffer-oriented request handlers inside an axum server.
//!
//! Inbound requests are converted into a [`ServerRequest`] whose body is a
//! blocking [`MessageStream`]; the handler runs on tokio's blocking pool and
//! its [`SyncResponse`] is converted back into an axum response. Bodies that
//! can hand themselves over to the runtime (see [`AsyncReadyStreamFactory`])
//! are written without blocking reads.

mod config;
mod convert_request;
mod convert_response;
mod converter;
mod error;
mod handler_bridge;
mod server_request;
mod stream;
mod uploaded_file;

pub use config::{
    ConverterConfig, DEFAULT_BODY_SIZE_LIMIT, DEFAULT_CHUNK_SIZE, DEFAULT_FIELD_COUNT_LIMIT,
};
pub use convert_request::into_server_request;
pub use convert_response::{Preloads, into_axum_response};
pub use converter::{BufferingConverter, MessageConverter, StreamingConverter};
pub use error::{Error, StreamError};
pub use handler_bridge::{RequestHandler, RequestHandlerBridge};
pub use server_request::{ClientInfo, FormValue, ParsedBody, ServerParams, ServerRequest};
pub use stream::{
    AdaptedAsyncStream, AsyncFactory, AsyncReadyStream, AsyncReadyStreamFactory, AsyncSource,
    AsyncStream, BufferedBody, DefaultStreamFactory, DelayedOpenFileStream, FileStream,
    MessageBody, MessageStream, MessageStreamReader, OpenMode, StreamFactory, StreamMetadata,
};
pub use uploaded_file::{BufferedUploadedFile, TempUploadedFile, UploadInfo, UploadedFile};

/// A response produced by a synchronous handler.
pub type SyncResponse = axum::http::Response<MessageBody>;

#[cfg(test)]
mod tests;
