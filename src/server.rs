//! HTTP host for the function handlers.
//!
//! Each route turns the incoming request into a [`FunctionEvent`], invokes
//! its handler and converts the [`FunctionResponse`] back. By default the
//! socket peer address is written into the client connection header the way
//! the hosting platform does it, so rate limiting buckets by the real peer.
//! Behind a reverse proxy every peer is the proxy itself; enable
//! [`FunctionServer::trust_proxy_headers`] there so the proxy's
//! `x-nf-client-connection-ip` or `x-forwarded-for` decides the bucket.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use crate::function::{FunctionEvent, FunctionHandler};
use crate::ratelimit::{CLIENT_IP_HEADER, FORWARDED_FOR_HEADER};

/// Largest request body accepted, in bytes.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
struct AppState {
    pets: Arc<dyn FunctionHandler>,
    favorites: Arc<dyn FunctionHandler>,
    trust_proxy_headers: bool,
}

/// HTTP server exposing the pets and favorites functions.
pub struct FunctionServer {
    /// Address to bind to
    addr: SocketAddr,
    state: AppState,
}

impl FunctionServer {
    /// Create a server for the given handlers.
    pub fn new(
        addr: SocketAddr,
        pets: Arc<dyn FunctionHandler>,
        favorites: Arc<dyn FunctionHandler>,
    ) -> Self {
        Self {
            addr,
            state: AppState {
                pets,
                favorites,
                trust_proxy_headers: false,
            },
        }
    }

    /// Keep client address headers already on the request.
    ///
    /// Only enable this when a trusted proxy sits in front and sets those
    /// headers itself; otherwise clients can pick their own bucket. The peer
    /// address is still used when neither header is present.
    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.state.trust_proxy_headers = trust;
        self
    }

    /// The configured listen address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Build the router without binding a socket.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/api/pets", any(pets_route))
            .route("/api/favorites", any(favorites_route))
            .route("/api/favorites/*pet_id", any(favorites_route))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            AppError::Server(format!("failed to bind {}: {}", self.addr, e))
        })?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Starting HTTP server with graceful shutdown");

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            AppError::Server(e.to_string())
        })
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn pets_route(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    invoke(state.pets.as_ref(), peer, state.trust_proxy_headers, request).await
}

async fn favorites_route(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    invoke(state.favorites.as_ref(), peer, state.trust_proxy_headers, request).await
}

/// Run `handler` for one HTTP request.
async fn invoke(
    handler: &dyn FunctionHandler,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
    request: Request<Body>,
) -> Response {
    let event = match to_event(peer, trust_proxy_headers, request).await {
        Ok(event) => event,
        Err(response) => return response,
    };

    match handler.handle(event).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            error!(error = %e, "Function handler failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn to_event(
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
    request: Request<Body>,
) -> std::result::Result<FunctionEvent, Response> {
    let (parts, body) = request.into_parts();

    let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        warn!(error = %e, "Failed to read request body");
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({ "error": "Request body too large" })),
        )
            .into_response()
    })?;
    let body = if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8(bytes.to_vec()).map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Request body must be UTF-8" })),
            )
                .into_response()
        })?)
    };

    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(query)| query)
        .unwrap_or_default();

    let mut headers = parts.headers;
    let proxied =
        headers.contains_key(CLIENT_IP_HEADER) || headers.contains_key(FORWARDED_FOR_HEADER);
    if let Some(peer) = peer.filter(|_| !(trust_proxy_headers && proxied)) {
        if let Ok(value) = HeaderValue::from_str(&peer.ip().to_string()) {
            headers.insert(CLIENT_IP_HEADER, value);
        }
    }

    Ok(FunctionEvent {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query,
        headers,
        body,
    })
}
