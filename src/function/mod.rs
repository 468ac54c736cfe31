//! Serverless-style function handlers.
//!
//! A function receives a [`FunctionEvent`] and produces a
//! [`FunctionResponse`]. Handlers compose by wrapping: the rate limiter in
//! [`crate::ratelimit::RateLimited`] is itself a handler around another one.

mod event;
mod response;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

pub use event::FunctionEvent;
pub use response::FunctionResponse;

use crate::error::HandlerError;

/// Result returned by every function handler.
pub type HandlerResult = std::result::Result<FunctionResponse, HandlerError>;

/// A request handler.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// Handle one request.
    async fn handle(&self, event: FunctionEvent) -> HandlerResult;
}

#[async_trait]
impl<H: FunctionHandler + ?Sized> FunctionHandler for Arc<H> {
    async fn handle(&self, event: FunctionEvent) -> HandlerResult {
        (**self).handle(event).await
    }
}

/// A handler backed by a closure.
pub struct HandlerFn<F> {
    f: F,
}

/// Turn a closure returning a boxed future into a [`FunctionHandler`].
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(FunctionEvent) -> BoxFuture<'static, HandlerResult> + Send + Sync,
{
    HandlerFn { f }
}

#[async_trait]
impl<F> FunctionHandler for HandlerFn<F>
where
    F: Fn(FunctionEvent) -> BoxFuture<'static, HandlerResult> + Send + Sync,
{
    async fn handle(&self, event: FunctionEvent) -> HandlerResult {
        (self.f)(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use futures::FutureExt;

    #[tokio::test]
    async fn test_handler_fn_and_arc_dispatch() {
        let handler: Arc<dyn FunctionHandler> = Arc::new(handler_fn(|event| {
            async move {
                Ok::<_, HandlerError>(FunctionResponse::empty(StatusCode::OK).with_body(event.path))
            }
            .boxed()
        }));

        let response = handler
            .handle(FunctionEvent::new(Method::GET, "/echo"))
            .await
            .unwrap();
        assert_eq!(response.body, "/echo");
    }

    #[test]
    fn test_handler_errors_are_returned() {
        let handler = handler_fn(|_event| {
            async { Err::<FunctionResponse, _>(HandlerError::Internal("offline".to_string())) }
                .boxed()
        });

        let result = tokio_test::block_on(handler.handle(FunctionEvent::new(Method::GET, "/")));
        assert_eq!(result.unwrap_err().to_string(), "offline");
    }
}
