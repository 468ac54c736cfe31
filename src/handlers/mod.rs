//! Pet adoption function handlers.

mod favorites;
mod pets;

pub use favorites::FavoritesHandler;
pub use pets::{PetListing, PetsHandler};

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;

use crate::function::{FunctionResponse, HandlerResult};

/// Headers every handler response carries.
fn cors_headers(allow_methods: &'static str, allow_headers: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(allow_headers));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(allow_methods));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// A JSON response carrying `cors`.
fn respond<T: Serialize + ?Sized>(status: StatusCode, body: &T, cors: &HeaderMap) -> HandlerResult {
    Ok(FunctionResponse::json(status, body)?.merge_headers(cors.clone()))
}

/// Empty 200 answer to a CORS preflight.
fn preflight(cors: &HeaderMap) -> FunctionResponse {
    FunctionResponse::empty(StatusCode::OK).merge_headers(cors.clone())
}
