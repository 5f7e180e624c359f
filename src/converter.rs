use axum::{
    body::Body as AxumBody, extract::Request as AxumRequest, response::Response as AxumResponse,
};
use futures::{FutureExt, future::BoxFuture};

use crate::{
    SyncResponse,
    config::ConverterConfig,
    convert_request::{buffer_body, form_kind, into_server_request, parse_form, with_request_head},
    convert_response,
    error::{Error, StreamError},
    server_request::ServerRequest,
    stream::{AdaptedAsyncStream, AsyncStream, BufferedBody, MessageBody},
    uploaded_file::{TempUploadedFile, UploadedFile},
};

/// Converts messages between axum and the synchronous handler shape.
pub trait MessageConverter: Send + Sync + 'static {
    fn convert_request(
        &self,
        request: AxumRequest<AxumBody>,
    ) -> BoxFuture<'static, Result<ServerRequest, Error>>;

    fn convert_response(
        &self,
        response: SyncResponse,
    ) -> BoxFuture<'static, Result<AxumResponse, Error>>;
}

/// Buffers every request body in memory before the handler runs.
///
/// Bodies over [`ConverterConfig::body_size_limit`] are rejected. Uploaded
/// files are kept in memory and `Link` headers stay on responses.
#[derive(Debug, Clone, Default)]
pub struct BufferingConverter {
    config: ConverterConfig,
}

impl BufferingConverter {
    pub fn new(config: ConverterConfig) -> Self {
        BufferingConverter { config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }
}

impl MessageConverter for BufferingConverter {
    fn convert_request(
        &self,
        request: AxumRequest<AxumBody>,
    ) -> BoxFuture<'static, Result<ServerRequest, Error>> {
        let config = self.config.clone();
        async move { into_server_request(request, &config).await }.boxed()
    }

    fn convert_response(
        &self,
        response: SyncResponse,
    ) -> BoxFuture<'static, Result<AxumResponse, Error>> {
        convert_response::convert(response, self.config.chunk_size(), true).boxed()
    }
}

/// Hands request bodies to the handler as they arrive.
///
/// Only form bodies are buffered, so they can be parsed; their files are
/// spooled to [`ConverterConfig::tmp_dir`]. Every other body is read from the
/// connection on demand through an [`AdaptedAsyncStream`]. `Link` headers are
/// removed from responses once their preloads have been collected.
#[derive(Debug, Clone, Default)]
pub struct StreamingConverter {
    config: ConverterConfig,
}

impl StreamingConverter {
    pub fn new(config: ConverterConfig) -> Self {
        StreamingConverter { config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }
}

impl MessageConverter for StreamingConverter {
    fn convert_request(
        &self,
        request: AxumRequest<AxumBody>,
    ) -> BoxFuture<'static, Result<ServerRequest, Error>> {
        let config = self.config.clone();
        async move { into_streaming_request(request, &config).await }.boxed()
    }

    fn convert_response(
        &self,
        response: SyncResponse,
    ) -> BoxFuture<'static, Result<AxumResponse, Error>> {
        convert_response::convert(response, self.config.chunk_size(), false).boxed()
    }
}

async fn into_streaming_request(
    request: AxumRequest<AxumBody>,
    config: &ConverterConfig,
) -> Result<ServerRequest, Error> {
    let (parts, body) = request.into_parts();

    let Some(kind) = form_kind(&parts.headers)? else {
        let body: MessageBody = Box::new(AdaptedAsyncStream::new(AsyncStream::Body(body)));
        return Ok(with_request_head(parts, config, body));
    };

    let body_bytes = buffer_body(body, config.body_size_limit()).await?;
    let form = parse_form(kind, body_bytes.clone(), config.field_count_limit()).await?;

    let mut files: Vec<Box<dyn UploadedFile>> = Vec::with_capacity(form.files.len());
    for file in form.files {
        let spooled = TempUploadedFile::spool(file.info, file.contents, config.tmp_dir())
            .await
            .map_err(StreamError::from)?;
        files.push(Box::new(spooled));
    }

    let body: MessageBody = Box::new(BufferedBody::new(body_bytes));
    Ok(with_request_head(parts, config, body)
        .with_parsed_body(Some(form.values))
        .with_uploaded_files(files))
}
