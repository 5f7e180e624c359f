use std::io::Write;

use axum::{
    body::to_bytes,
    http::{StatusCode, Version, header},
};

use super::text_response;
use crate::{
    AdaptedAsyncStream, AsyncReadyStreamFactory, AsyncStream, BufferingConverter,
    DefaultStreamFactory, FileStream, MessageBody, MessageConverter, Preloads, StreamFactory,
    StreamingConverter, SyncResponse, convert_response::into_axum_response,
};

const CHUNK: usize = crate::DEFAULT_CHUNK_SIZE;

#[tokio::test]
async fn test_basic_response() {
    let axum_response = into_axum_response(text_response("Hello World!"), CHUNK)
        .await
        .unwrap();

    assert_eq!(axum_response.status(), StatusCode::OK);
    let body = to_bytes(axum_response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "Hello World!");
}

#[tokio::test]
async fn test_response_with_status_and_headers() {
    let mut response = text_response("missing");
    *response.status_mut() = StatusCode::NOT_FOUND;
    *response.version_mut() = Version::HTTP_10;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
    response
        .headers_mut()
        .append("x-custom-header", "one".parse().unwrap());
    response
        .headers_mut()
        .append("x-custom-header", "two".parse().unwrap());

    let axum_response = into_axum_response(response, CHUNK).await.unwrap();

    assert_eq!(axum_response.status(), StatusCode::NOT_FOUND);
    assert_eq!(axum_response.version(), Version::HTTP_10);
    assert_eq!(
        axum_response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain"
    );
    let custom: Vec<_> = axum_response
        .headers()
        .get_all("x-custom-header")
        .iter()
        .collect();
    assert_eq!(custom, ["one", "two"]);
}

#[tokio::test]
async fn test_sync_body_is_read_in_chunks() {
    let content = "x".repeat(10_000);
    let axum_response = into_axum_response(text_response(content.clone()), 7)
        .await
        .unwrap();

    let body = to_bytes(axum_response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, content);
}

#[tokio::test]
async fn test_partially_read_body_sends_the_rest() {
    let mut body: MessageBody = Box::new(crate::BufferedBody::new("skip:rest"));
    body.read(5).unwrap();

    let axum_response = into_axum_response(SyncResponse::new(body), CHUNK)
        .await
        .unwrap();

    let body = to_bytes(axum_response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "rest");
}

#[tokio::test]
async fn test_file_stream_body() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(b"from a file").unwrap();

    let body: MessageBody = Box::new(FileStream::open(tmp.path(), "r").unwrap());
    let axum_response = into_axum_response(SyncResponse::new(body), 4)
        .await
        .unwrap();

    let body = to_bytes(axum_response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "from a file");
}

#[tokio::test]
async fn test_async_ready_file_body() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(b"async ready file").unwrap();

    let factory = AsyncReadyStreamFactory::new(DefaultStreamFactory);
    let body = factory.create_stream_from_file(tmp.path(), "rb").unwrap();

    let axum_response = into_axum_response(SyncResponse::new(body), CHUNK)
        .await
        .unwrap();

    let body = to_bytes(axum_response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "async ready file");
}

#[tokio::test]
async fn test_adapted_async_body_is_passed_through() {
    let body: MessageBody = Box::new(AdaptedAsyncStream::new(AsyncStream::Body(
        axum::body::Body::from("passed through"),
    )));

    let axum_response = into_axum_response(SyncResponse::new(body), CHUNK)
        .await
        .unwrap();

    let body = to_bytes(axum_response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "passed through");
}

#[tokio::test]
async fn test_preload_links() {
    let mut response = text_response("<html></html>");
    response.headers_mut().append(
        header::LINK,
        "</style.css>; rel=preload; as=style".parse().unwrap(),
    );
    response.headers_mut().append(
        header::LINK,
        "</app.js>; rel=\"preload\", </about>; rel=prefetch"
            .parse()
            .unwrap(),
    );

    let axum_response = into_axum_response(response, CHUNK).await.unwrap();

    assert_eq!(
        axum_response.extensions().get::<Preloads>(),
        Some(&Preloads(vec!["/style.css".into(), "/app.js".into()]))
    );
    assert_eq!(axum_response.headers().get_all(header::LINK).iter().count(), 2);
}

#[tokio::test]
async fn test_no_preloads_without_links() {
    let axum_response = into_axum_response(text_response("plain"), CHUNK)
        .await
        .unwrap();

    assert!(axum_response.extensions().get::<Preloads>().is_none());
}

#[tokio::test]
async fn test_link_headers_by_converter() {
    fn linked() -> SyncResponse {
        let mut response = text_response("linked");
        response
            .headers_mut()
            .insert(header::LINK, "</app.js>; rel=preload".parse().unwrap());
        response
    }

    let buffered = BufferingConverter::default()
        .convert_response(linked())
        .await
        .unwrap();
    assert!(buffered.headers().contains_key(header::LINK));
    assert!(buffered.extensions().get::<Preloads>().is_some());

    let streamed = StreamingConverter::default()
        .convert_response(linked())
        .await
        .unwrap();
    assert!(!streamed.headers().contains_key(header::LINK));
    assert_eq!(
        streamed.extensions().get::<Preloads>(),
        Some(&Preloads(vec!["/app.js".into()]))
    );
}
