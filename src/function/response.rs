//! Outbound response model for function handlers.

use axum::http::header::{IntoHeaderName, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// An HTTP response produced by a function handler.
#[derive(Debug, Clone)]
pub struct FunctionResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: String,
}

impl FunctionResponse {
    /// A response with an empty body and no headers.
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }

    /// A response with `value` serialized as the JSON body.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> serde_json::Result<Self> {
        Ok(Self::empty(status)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(serde_json::to_string(value)?))
    }

    /// Add or replace a header.
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Merge `headers` into this response.
    ///
    /// Headers already on the response are kept unless `headers` carries the
    /// same name, in which case every value for that name is replaced by the
    /// incoming values.
    pub fn merge_headers(mut self, headers: HeaderMap) -> Self {
        for name in headers.keys() {
            self.headers.remove(name);
            for value in headers.get_all(name) {
                self.headers.append(name.clone(), value.clone());
            }
        }
        self
    }

    /// Get a header as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parse the body as JSON.
    pub fn json_body(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}

impl IntoResponse for FunctionResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_sets_content_type() {
        let response = FunctionResponse::json(StatusCode::CREATED, &json!({"id": 7})).unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.json_body().unwrap()["id"], 7);
    }

    #[test]
    fn test_merge_keeps_base_headers() {
        let base = FunctionResponse::empty(StatusCode::OK)
            .with_header("x-custom", HeaderValue::from_static("v"));

        let mut extra = HeaderMap::new();
        extra.insert("X-RateLimit-Limit", HeaderValue::from_static("10"));
        let merged = base.merge_headers(extra);

        assert_eq!(merged.header("x-custom"), Some("v"));
        assert_eq!(merged.header("x-ratelimit-limit"), Some("10"));
    }

    #[test]
    fn test_merge_incoming_wins_on_conflict() {
        let mut base = FunctionResponse::empty(StatusCode::OK)
            .with_header("x-ratelimit-limit", HeaderValue::from_static("999"));
        base.headers
            .append("X-RateLimit-Limit", HeaderValue::from_static("998"));

        let mut extra = HeaderMap::new();
        extra.insert("X-RateLimit-Limit", HeaderValue::from_static("10"));
        let merged = base.merge_headers(extra);

        let values: Vec<_> = merged.headers.get_all("x-ratelimit-limit").iter().collect();
        assert_eq!(values, vec![&HeaderValue::from_static("10")]);
    }

    #[test]
    fn test_merge_preserves_status_and_body() {
        let base = FunctionResponse::empty(StatusCode::ACCEPTED).with_body("queued");
        let merged = base.merge_headers(HeaderMap::new());

        assert_eq!(merged.status, StatusCode::ACCEPTED);
        assert_eq!(merged.body, "queued");
    }
}
