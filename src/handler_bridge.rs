use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, header},
    response::Response,
};
use futures::Future;
use tower::Service;

use crate::{
    SyncResponse,
    converter::{BufferingConverter, MessageConverter},
    error::Error,
    server_request::ServerRequest,
};

/// A synchronous request handler.
///
/// Handlers run on tokio's blocking pool, so they are free to block on file
/// or network I/O and to read [`AdaptedAsyncStream`](crate::AdaptedAsyncStream)
/// bodies.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: ServerRequest) -> SyncResponse;
}

impl<F> RequestHandler for F
where
    F: Fn(ServerRequest) -> SyncResponse + Send + Sync + 'static,
{
    fn handle(&self, request: ServerRequest) -> SyncResponse {
        self(request)
    }
}

/// A Tower service that runs a synchronous [`RequestHandler`] within Axum
/// servers.
///
/// Each request is converted into a [`ServerRequest`], handed to the handler on
/// the blocking pool, and the handler's response converted back.
///
/// # Example
///
/// ```rust
/// use axum::http::Response;
/// use syncbridge::{BufferedBody, MessageBody, RequestHandlerBridge, ServerRequest};
///
/// let bridge = RequestHandlerBridge::new(|request: ServerRequest| {
///     let greeting = format!("Hello, {}!", request.query_param("name").unwrap_or("world"));
///     let body: MessageBody = Box::new(BufferedBody::new(greeting));
///     Response::new(body)
/// });
///
/// let app: axum::Router = axum::Router::new().fallback_service(bridge);
/// ```
pub struct RequestHandlerBridge<H, C = BufferingConverter> {
    handler: Arc<H>,
    converter: Arc<C>,
}

impl<H, C> Clone for RequestHandlerBridge<H, C> {
    fn clone(&self) -> Self {
        RequestHandlerBridge {
            handler: Arc::clone(&self.handler),
            converter: Arc::clone(&self.converter),
        }
    }
}

impl<H> RequestHandlerBridge<H>
where
    H: RequestHandler,
{
    /// Creates a bridge that buffers request bodies with the default limits.
    pub fn new(handler: H) -> Self {
        RequestHandlerBridge::with_converter(handler, BufferingConverter::default())
    }
}

impl<H, C> RequestHandlerBridge<H, C>
where
    H: RequestHandler,
    C: MessageConverter,
{
    /// Creates a bridge that converts messages with `converter`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use axum::http::Response;
    /// use syncbridge::{
    ///     ConverterConfig, MessageBody, RequestHandlerBridge, ServerRequest, StreamingConverter,
    /// };
    ///
    /// let converter = StreamingConverter::new(ConverterConfig::default());
    /// let bridge = RequestHandlerBridge::with_converter(
    ///     |request: ServerRequest| Response::new(request.into_body()),
    ///     converter,
    /// );
    /// ```
    pub fn with_converter(handler: H, converter: C) -> Self {
        RequestHandlerBridge {
            handler: Arc::new(handler),
            converter: Arc::new(converter),
        }
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }
}

impl<H, C> Service<Request> for RequestHandlerBridge<H, C>
where
    H: RequestHandler,
    C: MessageConverter,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        let converter = Arc::clone(&self.converter);

        Box::pin(async move {
            let response = match process_request_with_handler(req, handler, &*converter).await {
                Ok(resp) => resp,
                Err(err) => create_conversion_error_response(err),
            };
            Ok(response)
        })
    }
}

async fn process_request_with_handler<H, C>(
    req: Request,
    handler: Arc<H>,
    converter: &C,
) -> Result<Response, Error>
where
    H: RequestHandler,
    C: MessageConverter,
{
    let server_request = converter.convert_request(req).await?;

    let sync_response = tokio::task::spawn_blocking(move || handler.handle(server_request))
        .await
        .map_err(Error::Handler)?;

    converter.convert_response(sync_response).await
}

fn create_conversion_error_response(err: Error) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(
            error = %err,
            source = ?std::error::Error::source(&err),
            "request conversion failed"
        );
    } else {
        tracing::debug!(error = %err, "rejecting request");
    }

    let mut response = Response::new(Body::from(err.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

