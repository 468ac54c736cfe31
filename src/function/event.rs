//! Inbound request model for function handlers.

use std::collections::HashMap;

use axum::http::header::IntoHeaderName;
use axum::http::{HeaderMap, HeaderValue, Method};

/// An HTTP request as seen by a function handler.
#[derive(Debug, Clone)]
pub struct FunctionEvent {
    /// HTTP method
    pub method: Method,
    /// Request path, without query string
    pub path: String,
    /// Decoded query string parameters
    pub query: HashMap<String, String>,
    /// Request headers
    pub headers: HeaderMap,
    /// Raw request body, if any
    pub body: Option<String>,
}

impl FunctionEvent {
    /// Create an event with no headers, query or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Add or replace a header.
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a query string parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Get a header as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get a query string parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// The last non-empty path segment.
    pub fn last_path_segment(&self) -> Option<&str> {
        self.path.rsplit('/').find(|segment| !segment.is_empty())
    }
}
