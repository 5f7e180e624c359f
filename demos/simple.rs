//! Example showing synchronous handlers served next to native Axum routes.
//!
//! To run this example:
//! ```bash
//! RUST_LOG=syncbridge=debug cargo run --example simple
//! ```
//!
//! ```bash
//! # Axum route
//! curl http://localhost:3000/axum
//!
//! # Synchronous handler
//! curl "http://localhost:3000/hello?name=ferris"
//! curl -d "title=Holiday&tag=a&tag=b" http://localhost:3000/form
//! curl -F "photo=@Cargo.toml" http://localhost:3000/form
//! curl http://localhost:3000/file   # serves this crate's Cargo.toml
//! ```

use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::{
    Router,
    http::{HeaderValue, Response, StatusCode, header},
    routing::get,
};
use serde_json::{Map, Value, json};
use syncbridge::{
    AsyncReadyStreamFactory, ConverterConfig, DefaultStreamFactory, FormValue,
    RequestHandlerBridge, ServerRequest, StreamFactory, StreamingConverter, SyncResponse,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

async fn axum_hello() -> &'static str {
    "Hello from Axum!"
}

fn json_response(factory: &dyn StreamFactory, value: Value) -> SyncResponse {
    let mut response = Response::new(factory.create_stream(value.to_string().into()));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn handle(factory: &dyn StreamFactory, request: ServerRequest) -> SyncResponse {
    match request.uri().path() {
        "/hello" => {
            let name = request.query_param("name").unwrap_or("world");
            Response::new(factory.create_stream(format!("Hello, {name}!").into()))
        }
        "/form" => {
            let mut fields = Map::new();
            for (name, value) in request.parsed_body().into_iter().flatten() {
                let value = match value {
                    FormValue::Single(value) => json!(value),
                    FormValue::Multiple(values) => json!(values),
                };
                fields.insert(name.clone(), value);
            }
            let files: Vec<Value> = request
                .uploaded_files()
                .iter()
                .map(|file| {
                    json!({
                        "field": file.field_name(),
                        "filename": file.client_filename(),
                        "size": file.size(),
                    })
                })
                .collect();
            json_response(factory, json!({ "fields": fields, "files": files }))
        }
        "/file" => {
            let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
            match factory.create_stream_from_file(&path, "r") {
                Ok(body) => Response::new(body),
                Err(err) => {
                    let mut response =
                        Response::new(factory.create_stream(err.to_string().into()));
                    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                    response
                }
            }
        }
        _ => {
            let mut response = Response::new(factory.create_stream("Not Found".into()));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let factory = Arc::new(AsyncReadyStreamFactory::new(DefaultStreamFactory));
    let converter =
        StreamingConverter::new(ConverterConfig::default().with_body_size_limit(8 << 20));
    let bridge = RequestHandlerBridge::with_converter(
        move |request: ServerRequest| handle(&*factory, request),
        converter,
    );

    // Synchronous handler as the fallback for everything Axum doesn't route.
    let app = Router::new()
        .route("/axum", get(axum_hello))
        .fallback_service(bridge)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    println!("Server running on http://{}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
