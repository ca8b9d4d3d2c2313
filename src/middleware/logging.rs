use crate::middleware::{Middleware, MiddlewareResult, Next};
use async_trait::async_trait;
use axum::{body::Body, http::Request};
use std::time::Instant;

/// Logs method, path, status and latency for every request.
#[derive(Clone, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, request: Request<Body>, next: Next) -> MiddlewareResult {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let start = Instant::now();

        match next.run(request).await {
            Ok(response) => {
                tracing::info!(
                    %method,
                    %uri,
                    status = %response.status(),
                    elapsed = ?start.elapsed(),
                    "request handled"
                );
                Ok(response)
            }
            Err(err) => {
                tracing::warn!(
                    %method,
                    %uri,
                    error = %err,
                    elapsed = ?start.elapsed(),
                    "request failed"
                );
                Err(err)
            }
        }
    }
}
