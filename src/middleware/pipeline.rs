use crate::error::WeftError;
use crate::middleware::{Handler, Middleware, MiddlewareResult, Next};
use axum::{body::Body, http::Request, response::IntoResponse, response::Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// An ordered middleware chain.
///
/// The first-registered middleware is the outermost wrapper: it sees
/// the request first and the response last. The composed chain is
/// immutable for a given dispatch; each middleware runs at most once.
///
/// # Example
/// ```no_run
/// use weft::middleware::{handler_fn, LoggingMiddleware, Pipeline};
/// use std::sync::Arc;
///
/// let pipeline = Pipeline::new().with(Arc::new(LoggingMiddleware));
/// # let _ = pipeline;
/// ```
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

/// Fold right-to-left so the first middleware ends up outermost.
fn compose(middlewares: &[Arc<dyn Middleware>], base: Next) -> Next {
    let mut chain = base;
    for middleware in middlewares.iter().rev() {
        let middleware = middleware.clone();
        let tail = chain;
        chain = Next::new(move |req| {
            Box::pin(async move { middleware.handle(req, tail).await }) as _
        });
    }
    chain
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Append a middleware. Later additions wrap closer to the handler.
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run one request through the chain into `handler`.
    pub async fn dispatch(
        &self,
        request: Request<Body>,
        handler: Arc<dyn Handler>,
    ) -> MiddlewareResult {
        let base = Next::new(move |req| {
            Box::pin(async move { handler.call(req).await }) as _
        });

        compose(&self.middlewares, base).run(request).await
    }

    /// Convert into a tower [`Layer`] so the chain mounts on a router.
    pub fn into_layer(self) -> PipelineLayer {
        PipelineLayer {
            middlewares: Arc::new(self.middlewares),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Tower layer wrapping an inner service in a [`Pipeline`].
#[derive(Clone)]
pub struct PipelineLayer {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl<S> Layer<S> for PipelineLayer {
    type Service = PipelineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PipelineService {
            inner,
            middlewares: self.middlewares.clone(),
        }
    }
}

/// Tower service produced by [`PipelineLayer`].
///
/// Middleware errors are converted into responses here, so the
/// service's own error type stays that of the wrapped service.
#[derive(Clone)]
pub struct PipelineService<S> {
    inner: S,
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl<S> Service<Request<Body>> for PipelineService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<WeftError> + Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let middlewares = self.middlewares.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let base = Next::new(move |req| {
                Box::pin(async move { inner.call(req).await.map_err(Into::into) }) as _
            });

            match compose(&middlewares, base).run(request).await {
                Ok(response) => Ok(response),
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler_fn;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        order: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn handle(&self, request: Request<Body>, next: Next) -> MiddlewareResult {
            self.order
                .lock()
                .unwrap()
                .push(format!("{}:before", self.label));
            let response = next.run(request).await?;
            self.order
                .lock()
                .unwrap()
                .push(format!("{}:after", self.label));
            Ok(response)
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Middleware for ShortCircuit {
        async fn handle(&self, _request: Request<Body>, _next: Next) -> MiddlewareResult {
            Ok(StatusCode::FORBIDDEN.into_response())
        }
    }

    fn request() -> Request<Body> {
        Request::builder()
            .uri("http://localhost/test")
            .body(Body::empty())
            .unwrap()
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> Arc<dyn Handler> {
        handler_fn(move |_req| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(StatusCode::OK.into_response())
            }
        })
    }

    #[tokio::test]
    async fn first_registered_middleware_is_outermost() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .with(Arc::new(Recorder {
                label: "outer",
                order: order.clone(),
            }))
            .with(Arc::new(Recorder {
                label: "inner",
                order: order.clone(),
            }));

        let handler = counting_handler(Arc::new(AtomicUsize::new(0)));
        pipeline.dispatch(request(), handler).await.unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["outer:before", "inner:before", "inner:after", "outer:after"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_handler_and_inner_middleware() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .with(Arc::new(Recorder {
                label: "outer",
                order: order.clone(),
            }))
            .with(Arc::new(ShortCircuit))
            .with(Arc::new(Recorder {
                label: "inner",
                order: order.clone(),
            }));

        let response = pipeline
            .dispatch(request(), counting_handler(calls.clone()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*order.lock().unwrap(), vec!["outer:before", "outer:after"]);
    }

    #[tokio::test]
    async fn empty_pipeline_calls_handler_directly() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new();

        let response = pipeline
            .dispatch(request(), counting_handler(calls.clone()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn each_middleware_runs_once_per_dispatch() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new().with(Arc::new(Recorder {
            label: "only",
            order: order.clone(),
        }));
        let handler = counting_handler(Arc::new(AtomicUsize::new(0)));

        pipeline.dispatch(request(), handler.clone()).await.unwrap();
        pipeline.dispatch(request(), handler).await.unwrap();

        let order = order.lock().unwrap();
        assert_eq!(order.iter().filter(|e| *e == "only:before").count(), 2);
    }
}
