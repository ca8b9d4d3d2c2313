mod logging;
mod pipeline;
mod secure_cookies;
mod session;

pub use logging::LoggingMiddleware;
pub use pipeline::{Pipeline, PipelineLayer, PipelineService};
pub use secure_cookies::CookieSecurityMiddleware;
pub use session::SessionMiddleware;

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Standard return type for middleware and handlers.
pub type MiddlewareResult = crate::error::Result<Response>;

type NextFuture = Pin<Box<dyn Future<Output = MiddlewareResult> + Send>>;

/// The remainder of the chain after the current middleware.
///
/// Consumed on use, so each middleware invokes its tail at most once;
/// returning without calling [`Next::run`] short-circuits the dispatch.
pub struct Next {
    run: Box<dyn FnOnce(Request<Body>) -> NextFuture + Send>,
}

impl Next {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Request<Body>) -> NextFuture + Send + 'static,
    {
        Self { run: Box::new(f) }
    }

    /// Execute the rest of the chain.
    pub async fn run(self, request: Request<Body>) -> MiddlewareResult {
        (self.run)(request).await
    }
}

/// One layer of the request pipeline.
///
/// A middleware may transform the request before forwarding it and the
/// response on the way back.
///
/// # Example
/// ```
/// use weft::middleware::{Middleware, MiddlewareResult, Next};
/// use axum::{body::Body, http::Request};
/// use async_trait::async_trait;
///
/// struct ServerHeader;
///
/// #[async_trait]
/// impl Middleware for ServerHeader {
///     async fn handle(&self, request: Request<Body>, next: Next) -> MiddlewareResult {
///         let mut response = next.run(request).await?;
///         response.headers_mut().insert("server", "weft".parse().unwrap());
///         Ok(response)
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, request: Request<Body>, next: Next) -> MiddlewareResult;
}

/// The innermost request handler a pipeline wraps.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, request: Request<Body>) -> MiddlewareResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    async fn call(&self, request: Request<Body>) -> MiddlewareResult {
        (self.0)(request).await
    }
}

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
