use std::{
    collections::BTreeMap,
    net::{IpAddr, SocketAddr},
    time::SystemTime,
};

use axum::http::{
    Extensions, HeaderMap, HeaderValue, Method, Uri, Version, header::AsHeaderName, request,
};

use crate::{stream::MessageBody, uploaded_file::UploadedFile};

/// A parsed form body, keyed by field name.
pub type ParsedBody = BTreeMap<String, FormValue>;

/// The value(s) submitted for one form field.
///
/// Fields that were sent once are kept as [`FormValue::Single`]; repeated
/// fields keep every value in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Single(String),
    Multiple(Vec<String>),
}

impl FormValue {
    /// The first submitted value.
    pub fn first(&self) -> Option<&str> {
        match self {
            FormValue::Single(value) => Some(value),
            FormValue::Multiple(values) => values.first().map(String::as_str),
        }
    }

    /// All submitted values.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FormValue::Single(value) => vec![value.as_str()],
            FormValue::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }

    pub(crate) fn from_values(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            FormValue::Single(values.remove(0))
        } else {
            FormValue::Multiple(values)
        }
    }
}

/// Connection details a server may attach to a request as an extension.
///
/// When absent, the remote address is taken from axum's
/// [`ConnectInfo<SocketAddr>`](axum::extract::ConnectInfo) and encryption is
/// guessed from the URI scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub remote_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub encrypted: bool,
}

/// Server and connection values describing how a request arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerParams {
    pub https: bool,
    pub query_string: String,
    pub remote_addr: Option<IpAddr>,
    pub remote_port: Option<u16>,
    pub request_method: Method,
    /// User info from the request URI's authority, if any.
    pub remote_user: Option<String>,
    pub request_time: SystemTime,
    /// The request path, without the query.
    pub request_uri: String,
    pub server_addr: Option<IpAddr>,
    pub server_port: Option<u16>,
    /// e.g. `HTTP/1.1`.
    pub server_protocol: String,
    pub server_software: String,
    pub http_accept: Option<String>,
    pub http_accept_charset: Option<String>,
    pub http_accept_encoding: Option<String>,
    pub http_connection: Option<String>,
    pub http_referer: Option<String>,
    pub http_user_agent: Option<String>,
    pub http_host: Option<String>,
}

/// An inbound request in the synchronous shape handlers consume.
///
/// The request head is copied from the server request; cookies, query and
/// form values are pre-parsed, and the body is a blocking
/// [`MessageStream`](crate::MessageStream).
#[derive(Debug)]
pub struct ServerRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    extensions: Extensions,
    server_params: ServerParams,
    cookie_params: BTreeMap<String, String>,
    query_params: Vec<(String, String)>,
    parsed_body: Option<ParsedBody>,
    uploaded_files: Vec<Box<dyn UploadedFile>>,
    body: MessageBody,
}

impl ServerRequest {
    pub fn new(parts: request::Parts, server_params: ServerParams, body: MessageBody) -> Self {
        ServerRequest {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            extensions: parts.extensions,
            server_params,
            cookie_params: BTreeMap::new(),
            query_params: Vec::new(),
            parsed_body: None,
            uploaded_files: Vec::new(),
            body,
        }
    }

    pub fn with_cookie_params(mut self, cookies: BTreeMap<String, String>) -> Self {
        self.cookie_params = cookies;
        self
    }

    pub fn with_query_params(mut self, query: Vec<(String, String)>) -> Self {
        self.query_params = query;
        self
    }

    pub fn with_parsed_body(mut self, body: Option<ParsedBody>) -> Self {
        self.parsed_body = body;
        self
    }

    pub fn with_uploaded_files(mut self, files: Vec<Box<dyn UploadedFile>>) -> Self {
        self.uploaded_files = files;
        self
    }

    pub fn with_body(mut self, body: MessageBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// All values of a header joined with `", "`, or an empty string.
    pub fn header_line<K: AsHeaderName>(&self, name: K) -> String {
        self.headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn server_params(&self) -> &ServerParams {
        &self.server_params
    }

    pub fn cookie_params(&self) -> &BTreeMap<String, String> {
        &self.cookie_params
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookie_params.get(name).map(String::as_str)
    }

    /// Decoded query pairs in the order they appear.
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query_params
    }

    /// The first value for `name` in the query string.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn parsed_body(&self) -> Option<&ParsedBody> {
        self.parsed_body.as_ref()
    }

    pub fn uploaded_files(&self) -> &[Box<dyn UploadedFile>] {
        &self.uploaded_files
    }

    pub fn uploaded_files_mut(&mut self) -> &mut Vec<Box<dyn UploadedFile>> {
        &mut self.uploaded_files
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut MessageBody {
        &mut self.body
    }

    pub fn into_body(self) -> MessageBody {
        self.body
    }
}
