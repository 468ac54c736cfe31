//! Rate limiting wrapper for function handlers.

use async_trait::async_trait;
use axum::http::header::{CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use super::identity::client_identity;
use super::limiter::RateLimiter;
use super::window::{Decision, Policy};
use crate::function::{FunctionEvent, FunctionHandler, FunctionResponse, HandlerResult};

/// Header carrying the policy's request limit.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Header carrying the requests left in the current window.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Header carrying the window reset time as an ISO-8601 timestamp.
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Message returned to throttled clients.
const THROTTLED_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// Body of a 429 response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThrottledBody {
    error: &'static str,
    message: &'static str,
    retry_after: u64,
}

/// A handler guarded by a fixed-window rate limit.
///
/// Holds no counters of its own; all state lives in the limiter's store,
/// under keys scoped to `route` so each route's policy keeps its own window.
#[derive(Debug)]
pub struct RateLimited<H> {
    inner: H,
    limiter: RateLimiter,
    route: String,
    policy: Policy,
}

/// Wrap `handler` so every call is checked against `policy` first.
///
/// `route` names the bucket namespace. Handlers sharing a limiter but
/// wrapped under different routes never count against each other.
pub fn with_rate_limit<H: FunctionHandler>(
    handler: H,
    limiter: RateLimiter,
    route: impl Into<String>,
    policy: Policy,
) -> RateLimited<H> {
    RateLimited {
        inner: handler,
        limiter,
        route: route.into(),
        policy,
    }
}

/// Store key for `identity` on `route`, e.g. `pets:1.2.3.4`.
pub fn bucket_key(route: &str, identity: &str) -> String {
    format!("{}:{}", route, identity)
}

#[async_trait]
impl<H: FunctionHandler> FunctionHandler for RateLimited<H> {
    #[instrument(skip_all, fields(method = %event.method, path = %event.path))]
    async fn handle(&self, event: FunctionEvent) -> HandlerResult {
        let identity = client_identity(&event.headers);
        let decision = self
            .limiter
            .check(&bucket_key(&self.route, &identity), &self.policy);

        if !decision.allowed {
            let now = self.limiter.now();
            info!(
                identity = %identity,
                route = %self.route,
                limit = decision.limit,
                retry_after_secs = decision.retry_after_secs(now),
                "Request throttled"
            );
            return Ok(throttled_response(&decision, now)?);
        }

        // Handler faults propagate untouched; only successes are annotated
        let response = self.inner.handle(event).await?;
        Ok(response.merge_headers(rate_limit_headers(&decision)))
    }
}

/// Format a reset time the way clients expect it, e.g. `2024-05-01T12:00:00.000Z`.
pub fn format_reset_time(reset_time: DateTime<Utc>) -> String {
    reset_time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The `X-RateLimit-*` headers describing `decision`.
pub fn rate_limit_headers(decision: &Decision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    if let Ok(reset) = HeaderValue::from_str(&format_reset_time(decision.reset_time)) {
        headers.insert(X_RATELIMIT_RESET, reset);
    }
    headers
}

/// The 429 response sent in place of a throttled request.
pub fn throttled_response(
    decision: &Decision,
    now: DateTime<Utc>,
) -> serde_json::Result<FunctionResponse> {
    let retry_after = decision.retry_after_secs(now);
    let body = ThrottledBody {
        error: "Too Many Requests",
        message: THROTTLED_MESSAGE,
        retry_after,
    };

    let mut headers = rate_limit_headers(decision);
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(FunctionResponse::json(StatusCode::TOO_MANY_REQUESTS, &body)?.merge_headers(headers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::function::handler_fn;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::store::LimiterStore;
    use axum::http::Method;
    use chrono::Duration;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fixed_clock() -> Arc<ManualClock> {
        let start = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Arc::new(ManualClock::new(start))
    }

    fn request_from(ip: &'static str) -> FunctionEvent {
        FunctionEvent::new(Method::GET, "/api/pets")
            .with_header("x-nf-client-connection-ip", HeaderValue::from_static(ip))
    }

    fn counting_handler(calls: Arc<AtomicUsize>) -> impl FunctionHandler {
        handler_fn(move |_event| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(FunctionResponse::empty(StatusCode::OK)
                    .with_header("x-custom", HeaderValue::from_static("v")))
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_accepted_response_keeps_handler_headers() {
        let clock = fixed_clock();
        let limiter = RateLimiter::with_clock(Arc::new(LimiterStore::new()), clock);
        let calls = Arc::new(AtomicUsize::new(0));
        let wrapped = with_rate_limit(
            counting_handler(calls.clone()),
            limiter,
            "pets",
            Policy::new(10, 60_000).unwrap(),
        );

        let response = wrapped.handle(request_from("1.2.3.4")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("x-custom"), Some("v"));
        assert_eq!(response.header("x-ratelimit-limit"), Some("10"));
        assert_eq!(response.header("x-ratelimit-remaining"), Some("9"));
        assert_eq!(
            response.header("x-ratelimit-reset"),
            Some("2024-05-01T12:01:00.000Z")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_headers_override_handler_values() {
        let limiter = RateLimiter::with_clock(Arc::new(LimiterStore::new()), fixed_clock());
        let handler = handler_fn(|_event| {
            async move {
                Ok(FunctionResponse::empty(StatusCode::OK)
                    .with_header("x-ratelimit-limit", HeaderValue::from_static("999")))
            }
            .boxed()
        });
        let wrapped = with_rate_limit(handler, limiter, "pets", Policy::new(3, 1000).unwrap());

        let response = wrapped.handle(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(response.header("x-ratelimit-limit"), Some("3"));
    }

    #[tokio::test]
    async fn test_rejected_request_short_circuits() {
        let clock = fixed_clock();
        let limiter = RateLimiter::with_clock(Arc::new(LimiterStore::new()), clock.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let wrapped = with_rate_limit(
            counting_handler(calls.clone()),
            limiter,
            "pets",
            Policy::new(2, 1000).unwrap(),
        );

        wrapped.handle(request_from("1.2.3.4")).await.unwrap();
        wrapped.handle(request_from("1.2.3.4")).await.unwrap();
        clock.advance(Duration::milliseconds(250));
        let response = wrapped.handle(request_from("1.2.3.4")).await.unwrap();

        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(response.header("retry-after"), Some("1"));
        assert_eq!(response.header("x-ratelimit-limit"), Some("2"));
        assert_eq!(response.header("x-ratelimit-remaining"), Some("0"));
        assert_eq!(
            response.header("x-ratelimit-reset"),
            Some("2024-05-01T12:00:01.000Z")
        );
        assert_eq!(response.header("content-type"), Some("application/json"));

        let body = response.json_body().unwrap();
        assert_eq!(body["error"], "Too Many Requests");
        assert_eq!(body["retryAfter"], 1);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_handler_errors_pass_through() {
        let limiter = RateLimiter::with_clock(Arc::new(LimiterStore::new()), fixed_clock());
        let handler = handler_fn(|_event| {
            async move { Err(HandlerError::Internal("database offline".to_string())) }.boxed()
        });
        let wrapped = with_rate_limit(handler, limiter.clone(), "pets", Policy::default());

        let err = wrapped.handle(request_from("1.2.3.4")).await.unwrap_err();
        assert!(matches!(err, HandlerError::Internal(ref msg) if msg == "database offline"));
        // The attempt still counts against the client
        assert_eq!(limiter.store().get("pets:1.2.3.4").unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_unidentified_clients_share_a_bucket() {
        let limiter = RateLimiter::with_clock(Arc::new(LimiterStore::new()), fixed_clock());
        let calls = Arc::new(AtomicUsize::new(0));
        let wrapped = with_rate_limit(
            counting_handler(calls),
            limiter.clone(),
            "pets",
            Policy::new(1, 60_000).unwrap(),
        );

        let first = wrapped
            .handle(FunctionEvent::new(Method::GET, "/api/pets"))
            .await
            .unwrap();
        let second = wrapped
            .handle(FunctionEvent::new(Method::POST, "/api/favorites"))
            .await
            .unwrap();

        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limiter.store().get("pets:unknown").unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_routes_keep_separate_windows() {
        let clock = fixed_clock();
        let limiter = RateLimiter::with_clock(Arc::new(LimiterStore::new()), clock.clone());
        let pets = with_rate_limit(
            counting_handler(Arc::new(AtomicUsize::new(0))),
            limiter.clone(),
            "pets",
            Policy::new(100, 60_000).unwrap(),
        );
        let favorites = with_rate_limit(
            counting_handler(Arc::new(AtomicUsize::new(0))),
            limiter.clone(),
            "favorites",
            Policy::new(2, 1000).unwrap(),
        );

        for _ in 0..30 {
            pets.handle(request_from("1.2.3.4")).await.unwrap();
        }

        // The pets traffic does not eat into the favorites allowance
        let first = favorites.handle(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(first.header("x-ratelimit-remaining"), Some("1"));
        assert_eq!(
            first.header("x-ratelimit-reset"),
            Some("2024-05-01T12:00:01.000Z")
        );
        favorites.handle(request_from("1.2.3.4")).await.unwrap();
        let third = favorites.handle(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(third.status, StatusCode::TOO_MANY_REQUESTS);

        // Favorites resets on its own 1000 ms window
        clock.advance(Duration::milliseconds(1000));
        let after = favorites.handle(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(after.status, StatusCode::OK);

        assert_eq!(limiter.store().get("pets:1.2.3.4").unwrap().count, 30);
        assert_eq!(limiter.store().get("favorites:1.2.3.4").unwrap().count, 1);
    }

    #[test]
    fn test_bucket_key() {
        assert_eq!(bucket_key("favorites", "10.0.0.1"), "favorites:10.0.0.1");
    }

    #[test]
    fn test_format_reset_time() {
        let reset = DateTime::parse_from_rfc3339("2024-05-01T12:00:01.5+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_reset_time(reset), "2024-05-01T10:00:01.500Z");
    }
}
