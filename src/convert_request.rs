use std::{collections::BTreeMap, io, net::SocketAddr, time::SystemTime};

use axum::{
    body::Body as AxumBody,
    extract::{ConnectInfo, Request as AxumRequest},
    http::{HeaderMap, Version, header, request},
};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::{
    config::ConverterConfig,
    error::Error,
    server_request::{ClientInfo, FormValue, ParsedBody, ServerParams, ServerRequest},
    stream::{BufferedBody, MessageBody},
    uploaded_file::{BufferedUploadedFile, UploadInfo, UploadedFile},
};

/// Convert an axum request into a [`ServerRequest`] with a fully buffered
/// body.
///
/// Form bodies are parsed into [`ServerRequest::parsed_body`] and their files
/// kept in memory as [`BufferedUploadedFile`]s. The raw body stays readable
/// either way.
pub async fn into_server_request(
    axum_request: AxumRequest<AxumBody>,
    config: &ConverterConfig,
) -> Result<ServerRequest, Error> {
    let (parts, body) = axum_request.into_parts();
    let form = form_kind(&parts.headers)?;
    let body_bytes = buffer_body(body, config.body_size_limit()).await?;

    let body: MessageBody = Box::new(BufferedBody::new(body_bytes.clone()));
    let mut converted = with_request_head(parts, config, body);

    if let Some(kind) = form {
        let form = parse_form(kind, body_bytes, config.field_count_limit()).await?;
        let files = form
            .files
            .into_iter()
            .map(|file| {
                Box::new(BufferedUploadedFile::new(file.info, file.contents)) as Box<dyn UploadedFile>
            })
            .collect();

        converted = converted
            .with_parsed_body(Some(form.values))
            .with_uploaded_files(files);
    }

    Ok(converted)
}

/// Build the request head: server params, headers, cookies, query and
/// protocol version.
pub(crate) fn with_request_head(
    parts: request::Parts,
    config: &ConverterConfig,
    body: MessageBody,
) -> ServerRequest {
    let server_params = server_params(&parts, config);
    let cookies = cookie_params(&parts.headers);
    let query = query_params(parts.uri.query());
    let version = parts.version;

    tracing::debug!(
        method = %parts.method,
        uri = %parts.uri,
        cookies = cookies.len(),
        "converting request"
    );

    ServerRequest::new(parts, server_params, body)
        .with_cookie_params(cookies)
        .with_query_params(query)
        .with_version(version)
}

fn server_params(parts: &request::Parts, config: &ConverterConfig) -> ServerParams {
    let client = parts.extensions.get::<ClientInfo>().copied();
    let remote = client.and_then(|client| client.remote_addr).or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr)
    });
    let local = client.and_then(|client| client.local_addr);
    let https = match client {
        Some(client) => client.encrypted,
        None => parts.uri.scheme_str() == Some("https"),
    };

    let header_value = |name: header::HeaderName| {
        parts
            .headers
            .get(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    };

    ServerParams {
        https,
        query_string: parts.uri.query().unwrap_or_default().to_owned(),
        remote_addr: remote.map(|addr| addr.ip()),
        remote_port: remote.map(|addr| addr.port()),
        request_method: parts.method.clone(),
        remote_user: parts
            .uri
            .authority()
            .and_then(|authority| authority.as_str().rsplit_once('@'))
            .map(|(user, _)| user.to_owned()),
        request_time: SystemTime::now(),
        request_uri: parts.uri.path().to_owned(),
        server_addr: local.map(|addr| addr.ip()),
        server_port: local.map(|addr| addr.port()),
        server_protocol: protocol_name(parts.version).to_owned(),
        server_software: config.server_software().to_owned(),
        http_accept: header_value(header::ACCEPT),
        http_accept_charset: header_value(header::ACCEPT_CHARSET),
        http_accept_encoding: header_value(header::ACCEPT_ENCODING),
        http_connection: header_value(header::CONNECTION),
        http_referer: header_value(header::REFERER),
        http_user_agent: header_value(header::USER_AGENT),
        http_host: header_value(header::HOST),
    }
}

fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        // Default to 1.1 for unknown versions.
        _ => "HTTP/1.1",
    }
}

/// Collect `name=value` pairs from every `Cookie` header. Later values win.
pub(crate) fn cookie_params(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();

    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else {
            tracing::warn!("ignoring cookie header that is not valid ASCII");
            continue;
        };

        for pair in value.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|value| value.strip_suffix('"'))
                .unwrap_or(value);
            cookies.insert(name.to_owned(), value.to_owned());
        }
    }

    cookies
}

/// Decode the query string into ordered pairs.
pub(crate) fn query_params(query: Option<&str>) -> Vec<(String, String)> {
    let Some(query) = query.filter(|query| !query.is_empty()) else {
        return Vec::new();
    };

    serde_urlencoded::from_str(query).unwrap_or_else(|err| {
        tracing::warn!(%err, "ignoring malformed query string");
        Vec::new()
    })
}

/// The kinds of body that are parsed into form values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FormKind {
    UrlEncoded,
    Multipart { boundary: String },
}

/// Detect a form body from the `Content-Type` header.
pub(crate) fn form_kind(headers: &HeaderMap) -> Result<Option<FormKind>, Error> {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return Ok(None);
    };
    let content_type = content_type.trim_start();

    let urlencoded = mime::APPLICATION_WWW_FORM_URLENCODED.essence_str();
    if content_type
        .get(..urlencoded.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(urlencoded))
    {
        return Ok(Some(FormKind::UrlEncoded));
    }

    let Ok(parsed) = content_type.parse::<mime::Mime>() else {
        return Ok(None);
    };
    if parsed.type_() != mime::MULTIPART
        || (parsed.subtype() != mime::FORM_DATA && parsed.subtype() != "mixed")
    {
        return Ok(None);
    }

    let boundary = parsed
        .get_param(mime::BOUNDARY)
        .map(|boundary| boundary.as_str().trim_matches('"'))
        .filter(|boundary| !boundary.is_empty());

    match boundary {
        Some(boundary) => Ok(Some(FormKind::Multipart {
            boundary: boundary.to_owned(),
        })),
        None => Err(Error::MalformedForm("multipart body without a boundary".into())),
    }
}

/// Read the whole body, failing once more than `limit` bytes arrive.
pub(crate) async fn buffer_body(body: AxumBody, limit: usize) -> Result<Bytes, Error> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.is::<LengthLimitError>() => Err(Error::BodyTooLarge { limit }),
        Err(err) => Err(Error::Body(axum::Error::new(err))),
    }
}

/// A file part of a multipart form.
#[derive(Debug)]
pub(crate) struct FormFile {
    pub(crate) info: UploadInfo,
    pub(crate) contents: Bytes,
}

#[derive(Debug, Default)]
pub(crate) struct Form {
    pub(crate) values: ParsedBody,
    pub(crate) files: Vec<FormFile>,
}

/// Parse a buffered form body, counting files against `field_limit` too.
pub(crate) async fn parse_form(
    kind: FormKind,
    body: Bytes,
    field_limit: usize,
) -> Result<Form, Error> {
    let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut files = Vec::new();

    match kind {
        FormKind::UrlEncoded => {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&body)
                .map_err(|err| Error::MalformedForm(err.to_string()))?;
            if pairs.len() > field_limit {
                return Err(Error::TooManyFields { limit: field_limit });
            }
            for (name, value) in pairs {
                values.entry(name).or_default().push(value);
            }
        }
        FormKind::Multipart { boundary } => {
            let stream = futures::stream::once(async move { Ok::<_, io::Error>(body) });
            let mut multipart = multer::Multipart::new(stream, boundary);
            let mut count = 0;

            while let Some(field) = multipart.next_field().await? {
                count += 1;
                if count > field_limit {
                    return Err(Error::TooManyFields { limit: field_limit });
                }

                let name = field.name().unwrap_or_default().to_owned();
                match field.file_name() {
                    Some(filename) => {
                        let info = UploadInfo {
                            field_name: name,
                            filename: Some(filename.to_owned()),
                            media_type: field.content_type().map(ToString::to_string),
                        };
                        let contents = field.bytes().await?;
                        files.push(FormFile { info, contents });
                    }
                    None => {
                        let value = field.text().await?;
                        values.entry(name).or_default().push(value);
                    }
                }
            }
        }
    }

    let values = values
        .into_iter()
        .map(|(name, values)| (name, FormValue::from_values(values)))
        .collect();

    Ok(Form { values, files })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn detects_form_content_types() {
        assert_eq!(
            form_kind(&headers("application/x-www-form-urlencoded; charset=utf-8")).unwrap(),
            Some(FormKind::UrlEncoded)
        );
        assert_eq!(
            form_kind(&headers("multipart/form-data; boundary=\"abc\"")).unwrap(),
            Some(FormKind::Multipart {
                boundary: "abc".into()
            })
        );
        assert_eq!(
            form_kind(&headers(" multipart/mixed; boundary=xyz")).unwrap(),
            Some(FormKind::Multipart {
                boundary: "xyz".into()
            })
        );
        assert_eq!(form_kind(&headers("application/json")).unwrap(), None);
        assert_eq!(form_kind(&HeaderMap::new()).unwrap(), None);
        assert!(matches!(
            form_kind(&headers("multipart/form-data")),
            Err(Error::MalformedForm(_))
        ));
    }

    #[test]
    fn names_protocol_versions() {
        assert_eq!(protocol_name(Version::HTTP_10), "HTTP/1.0");
        assert_eq!(protocol_name(Version::HTTP_11), "HTTP/1.1");
        assert_eq!(protocol_name(Version::HTTP_2), "HTTP/2");
        assert_eq!(protocol_name(Version::HTTP_3), "HTTP/3");
    }

    #[test]
    fn parses_cookies_from_every_header() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; b=\"two\""));
        headers.append(header::COOKIE, HeaderValue::from_static("c=3;malformed; a=4"));

        let cookies = cookie_params(&headers);
        assert_eq!(cookies.get("a").map(String::as_str), Some("4"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("two"));
        assert_eq!(cookies.get("c").map(String::as_str), Some("3"));
        assert_eq!(cookies.len(), 3);
    }

    #[test]
    fn decodes_query_pairs_in_order() {
        let pairs = query_params(Some("q=rust+lang&tag=a&tag=b&empty="));
        assert_eq!(
            pairs,
            vec![
                ("q".to_owned(), "rust lang".to_owned()),
                ("tag".to_owned(), "a".to_owned()),
                ("tag".to_owned(), "b".to_owned()),
                ("empty".to_owned(), String::new()),
            ]
        );
        assert!(query_params(None).is_empty());
    }

    #[tokio::test]
    async fn collapses_single_form_values() {
        let form = parse_form(
            FormKind::UrlEncoded,
            Bytes::from_static(b"name=ferris&tag=a&tag=b"),
            10,
        )
        .await
        .unwrap();

        assert_eq!(
            form.values.get("name"),
            Some(&FormValue::Single("ferris".into()))
        );
        assert_eq!(
            form.values.get("tag"),
            Some(&FormValue::Multiple(vec!["a".into(), "b".into()]))
        );
    }

    #[tokio::test]
    async fn enforces_field_limit() {
        let err = parse_form(FormKind::UrlEncoded, Bytes::from_static(b"a=1&b=2&c=3"), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TooManyFields { limit: 2 }));
    }

    #[tokio::test]
    async fn enforces_body_limit() {
        let err = buffer_body(AxumBody::from("0123456789"), 4).await.unwrap_err();
        assert!(matches!(err, Error::BodyTooLarge { limit: 4 }));

        let bytes = buffer_body(AxumBody::from("0123"), 4).await.unwrap();
        assert_eq!(bytes, "0123");
    }
}
