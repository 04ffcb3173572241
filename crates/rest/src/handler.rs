//! Parses a live HTTP request/response into the `Interaction` shape the
//! store persists, and classifies streaming responses.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Request, Response};
use relaydeck_common::RequestId;

use crate::redact::Redactor;

/// A fresh opaque `request_id` for a newly-observed REST request.
pub fn new_request_id() -> RequestId {
    RequestId::new_rest()
}

/// Header map collapsed to the store's key→joined-value shape. Multi-value
/// headers are joined with `", "`.
pub fn serialize_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut result: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers.iter() {
        let value = value.to_str().unwrap_or("").to_string();
        result.entry(name.as_str().to_string()).or_default().push(value);
    }
    result.into_iter().map(|(k, v)| (k, v.join(", "))).collect()
}

/// Read a request body fully into memory and return it as `Bytes`, leaving
/// the caller free to rebuild an equivalent body for forwarding (the proxy
/// never needs to "rewind" a stream: it just constructs a new request from
/// the captured bytes).
pub async fn buffer_request_body<B>(req: Request<B>) -> (http::request::Parts, Bytes)
where
    B: http_body::Body<Data = Bytes>,
    B::Error: std::fmt::Debug,
{
    let (parts, body) = req.into_parts();
    let bytes = http_body_util::BodyExt::collect(body)
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    (parts, bytes)
}

pub async fn buffer_response_body<B>(resp: Response<B>) -> (http::response::Parts, Bytes)
where
    B: http_body::Body<Data = Bytes>,
    B::Error: std::fmt::Debug,
{
    let (parts, body) = resp.into_parts();
    let bytes = http_body_util::BodyExt::collect(body)
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    (parts, bytes)
}

/// Content-type contains `text/event-stream` (case-insensitive) ⇒ the
/// response is a server-sent-events stream.
pub fn is_sse_response(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("text/event-stream"))
        .unwrap_or(false)
}

/// Apply the redactor to a serialized header map, returning a new map (the
/// original, unredacted headers are still forwarded upstream/to the client;
/// only the persisted/compared copy is redacted).
pub fn redacted_headers(headers: &HashMap<String, String>, redactor: &Redactor) -> HashMap<String, String> {
    redactor.redact_headers(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn serialize_headers_joins_multi_value_entries() {
        let mut headers = HeaderMap::new();
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));

        let serialized = serialize_headers(&headers);
        assert_eq!(serialized["accept"], "text/html, application/json");
    }

    #[test]
    fn detects_event_stream_content_type_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("Text/Event-Stream; charset=utf-8"));
        assert!(is_sse_response(&headers));
    }

    #[test]
    fn non_streaming_content_type_is_not_sse() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_sse_response(&headers));
    }
}
