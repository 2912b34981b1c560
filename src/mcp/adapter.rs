//! Inbound request adaptation.
//!
//! The protocol transport consumes stream-oriented requests; inbound HTTP
//! frameworks hand us parsed ones. [`AdaptedRequest`] bridges the two using
//! nothing beyond method, URL, headers, and body text, so any inbound
//! transport (fetch-style, socket-style) can be adapted.

use actix_web::web::Bytes;
use actix_web::HttpRequest;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::resolver::SESSION_ID_HEADER;

/// Transport-facing request: method, path+query, case-insensitive headers,
/// and the body as a single-shot byte stream.
#[derive(Debug, Clone)]
pub struct AdaptedRequest {
    method: String,
    uri: String,
    headers: HashMap<String, String>,
    body: Bytes,
}

impl AdaptedRequest {
    /// Build an adapted request from raw parts. Header names are
    /// lower-cased; a supplied `session_id` injects or overrides the
    /// session header.
    pub fn new(
        method: &str,
        uri: &str,
        headers: impl IntoIterator<Item = (String, String)>,
        body: impl Into<Bytes>,
        session_id: Option<&str>,
    ) -> Self {
        let mut headers: HashMap<String, String> = headers
            .into_iter()
            .map(|(name, value)| (name.to_lowercase(), value))
            .collect();

        if let Some(id) = session_id {
            headers.insert(SESSION_ID_HEADER.to_string(), id.to_string());
        }

        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            headers,
            body: body.into(),
        }
    }

    /// Adapt an actix request plus its already-read payload.
    pub fn from_http(req: &HttpRequest, body: Bytes, session_id: Option<&str>) -> Self {
        let headers = req.headers().iter().filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        });

        Self::new(req.method().as_str(), &req.uri().to_string(), headers, body, session_id)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path plus query, as received.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.header(SESSION_ID_HEADER)
    }

    /// Consume the request, exposing the body as a single-shot stream:
    /// the payload is emitted once, then end-of-stream. An empty body ends
    /// immediately without blocking.
    pub fn into_body_stream(self) -> BodyStream {
        BodyStream {
            body: if self.body.is_empty() {
                None
            } else {
                Some(self.body)
            },
        }
    }
}

/// Single-shot byte stream over an already-buffered body.
pub struct BodyStream {
    body: Option<Bytes>,
}

impl Stream for BodyStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        Poll::Ready(self.body.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn adapts_post_with_session_header_and_one_shot_body() {
        let request = AdaptedRequest::new(
            "POST",
            "/mcp-stateless",
            vec![("X-MCP-Session-Id".to_string(), "S".to_string())],
            r#"{"a":1}"#,
            None,
        );

        assert_eq!(request.method(), "POST");
        assert_eq!(request.uri(), "/mcp-stateless");
        assert_eq!(request.session_id(), Some("S"));

        let mut stream = request.into_body_stream();
        assert_eq!(stream.next().await, Some(Bytes::from(r#"{"a":1}"#)));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn supplied_session_id_overrides_the_header() {
        let request = AdaptedRequest::new(
            "POST",
            "/mcp",
            vec![("x-mcp-session-id".to_string(), "stale".to_string())],
            "",
            Some("fresh"),
        );

        assert_eq!(request.session_id(), Some("fresh"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = AdaptedRequest::new(
            "GET",
            "/mcp?status=check",
            vec![("Content-Type".to_string(), "application/json".to_string())],
            "",
            None,
        );

        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[tokio::test]
    async fn empty_body_ends_the_stream_immediately() {
        let request = AdaptedRequest::new("POST", "/mcp", vec![], "", None);

        let mut stream = request.into_body_stream();
        assert_eq!(stream.next().await, None);
    }
}
