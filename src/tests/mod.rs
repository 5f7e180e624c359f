mod response;

use axum::http::Response;

use crate::{BufferedBody, MessageBody, SyncResponse};

/// A plain in-memory handler response.
fn text_response(text: impl Into<bytes::Bytes>) -> SyncResponse {
    let body: MessageBody = Box::new(BufferedBody::new(text));
    Response::new(body)
}
