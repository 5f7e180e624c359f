use axum::{
    http::{HeaderMap, header},
    response::Response as AxumResponse,
};

use crate::{
    SyncResponse,
    error::Error,
    stream::{AsyncStream, MessageStreamReader},
};

/// Targets of `Link: <...>; rel=preload` headers on a converted response.
///
/// Attached as a response extension so a server that supports push or early
/// hints can act on them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preloads(pub Vec<String>);

/// Convert a handler response into an axum response.
///
/// Bodies that can hand over an async source are written from it directly;
/// anything else is read in `chunk_size` pieces on tokio's blocking pool.
pub async fn into_axum_response(
    sync_response: SyncResponse,
    chunk_size: usize,
) -> Result<AxumResponse, Error> {
    convert(sync_response, chunk_size, true).await
}

pub(crate) async fn convert(
    sync_response: SyncResponse,
    chunk_size: usize,
    keep_links: bool,
) -> Result<AxumResponse, Error> {
    let (mut parts, mut body) = sync_response.into_parts();

    let preloads = preload_links(&parts.headers);
    if !keep_links {
        parts.headers.remove(header::LINK);
    }

    let stream = match body.take_async() {
        Some(source) => source.await?,
        None => AsyncStream::Reader(Box::new(MessageStreamReader::new(body))),
    };

    tracing::debug!(
        status = %parts.status,
        preloads = preloads.len(),
        ?stream,
        "converting response"
    );

    let mut converted = AxumResponse::from_parts(parts, stream.into_body(chunk_size));
    if !preloads.is_empty() {
        converted.extensions_mut().insert(Preloads(preloads));
    }

    Ok(converted)
}

/// Collect the targets of every `rel=preload` link.
pub(crate) fn preload_links(headers: &HeaderMap) -> Vec<String> {
    let mut preloads = Vec::new();

    for value in headers.get_all(header::LINK) {
        let Ok(value) = value.to_str() else {
            continue;
        };

        let mut rest = value;
        while let Some(start) = rest.find('<') {
            let Some(len) = rest[start..].find('>') else {
                break;
            };
            let target = rest[start + 1..start + len].trim();
            let (params, next) = split_link(&rest[start + len + 1..]);

            if params.split(';').any(is_preload) {
                preloads.push(target.to_owned());
            }
            rest = next;
        }
    }

    preloads
}

/// Split off the parameters of one link, up to the next comma outside quotes.
fn split_link(value: &str) -> (&str, &str) {
    let mut quoted = false;
    for (i, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => return (&value[..i], &value[i + 1..]),
            _ => {}
        }
    }
    (value, "")
}

fn is_preload(param: &str) -> bool {
    let Some((name, value)) = param.split_once('=') else {
        return false;
    };
    name.trim().eq_ignore_ascii_case("rel")
        && value
            .trim()
            .trim_matches('"')
            .split_ascii_whitespace()
            .any(|rel| rel.eq_ignore_ascii_case("preload"))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn finds_preload_links() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::LINK,
            HeaderValue::from_static("</style.css>; rel=preload; as=style, </next>; rel=next"),
        );
        headers.append(
            header::LINK,
            HeaderValue::from_static("</app.js>; rel=\"preload modulepreload\"; title=\"a, b\""),
        );
        headers.append(header::LINK, HeaderValue::from_static("</font.woff2>; REL=Preload"));

        assert_eq!(
            preload_links(&headers),
            vec!["/style.css", "/app.js", "/font.woff2"]
        );
    }

    #[test]
    fn ignores_links_without_preload() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::LINK,
            HeaderValue::from_static("<https://example.com/>; rel=canonical"),
        );

        assert!(preload_links(&headers).is_empty());
        assert!(preload_links(&HeaderMap::new()).is_empty());
    }
}
