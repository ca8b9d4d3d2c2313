use crate::config::SessionConfig;
use crate::cookie::{parse_cookie_header, Cookie, CookieJar};
use crate::di::{arg_arc, Container, ServiceId};
use crate::error::WeftError;
use crate::middleware::{Middleware, MiddlewareResult, Next};
use crate::session::{Session, SessionBackend, SessionState};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
};
use std::collections::HashMap;
use std::sync::Arc;

/// Starts or resumes a session around the wrapped handler.
///
/// On entry the inbound session-identifier cookie (read through the
/// decoded [`CookieJar`], so it participates in cookie protection) is
/// adopted lazily; nothing loads until the handler first touches a
/// section. The handle is placed in the request extensions and
/// scope-bound into the container, so nested dispatches shadow and then
/// restore the outer "current session".
///
/// On exit a destroyed session schedules an already-expired identifier
/// cookie; a started session persists its data and schedules the
/// identifier cookie only when the outbound id differs from the inbound
/// one.
pub struct SessionMiddleware {
    config: SessionConfig,
    backend: Arc<dyn SessionBackend>,
    container: Container,
}

impl SessionMiddleware {
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn SessionBackend>,
        container: Container,
    ) -> Self {
        Self {
            config,
            backend,
            container,
        }
    }

    /// The jar normally comes from the cookie security middleware; when
    /// running without one, fall back to an unprotected view of the
    /// `Cookie` header.
    fn jar_for(&self, request: &Request<Body>) -> (CookieJar, bool) {
        if let Some(jar) = request.extensions().get::<CookieJar>() {
            return (jar.clone(), false);
        }
        let mut inbound = HashMap::new();
        if let Some(raw) = request
            .headers()
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
        {
            for (name, value) in parse_cookie_header(raw) {
                inbound.insert(name, Some(value));
            }
        }
        (CookieJar::from_decoded(inbound), true)
    }

    fn identifier_cookie(&self, id: String) -> Cookie {
        let mut cookie = Cookie::new(self.config.cookie_name.clone(), id);
        if let Some(lifetime) = self.config.lifetime {
            cookie = cookie.with_max_age(lifetime);
        }
        cookie
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    async fn handle(&self, mut request: Request<Body>, next: Next) -> MiddlewareResult {
        let (jar, owns_jar) = self.jar_for(&request);
        if owns_jar {
            request.extensions_mut().insert(jar.clone());
        }

        let inbound_id = jar.get(&self.config.cookie_name);
        let session = Arc::new(Session::new(self.backend.clone(), inbound_id.clone()));
        request.extensions_mut().insert(session.clone());

        let scope = self
            .container
            .scoped(ServiceId::of::<Session>(), arg_arc(session.clone()));
        let result = next.run(request).await;
        // Restore the outer session binding before committing; the
        // handler's error still propagates after cleanup.
        drop(scope);
        let mut response = result?;

        match session.state() {
            SessionState::Destroyed => {
                jar.set(Cookie::expired(&self.config.cookie_name));
            }
            SessionState::Started => {
                session.commit();
                let id = session.id().ok_or_else(|| {
                    WeftError::Internal("started session has no identifier".to_string())
                })?;
                if inbound_id.as_deref() != Some(id.as_str()) {
                    jar.set(self.identifier_cookie(id));
                }
            }
            SessionState::NotStarted => {}
        }

        // Without a cookie security layer outside us, nobody else will
        // drain the jar.
        if owns_jar {
            for cookie in jar.take_outbound() {
                let header_value = HeaderValue::from_str(&cookie.to_header_value())
                    .map_err(|e| {
                        WeftError::Internal(format!("invalid Set-Cookie header: {e}"))
                    })?;
                response.headers_mut().append(header::SET_COOKIE, header_value);
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CookieProtection, CookieSecurityConfig};
    use crate::cookie::SESSION_COOKIE;
    use crate::crypto::{SecretService, KEY_SIZE};
    use crate::middleware::{handler_fn, CookieSecurityMiddleware, Handler, Pipeline};
    use crate::session::MemorySessionBackend;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use std::time::Duration;

    struct Harness {
        container: Container,
        backend: Arc<MemorySessionBackend>,
        secrets: Arc<SecretService>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                container: Container::new(),
                backend: Arc::new(MemorySessionBackend::new(Duration::from_secs(3600))),
                secrets: Arc::new(SecretService::new(vec![5u8; KEY_SIZE]).unwrap()),
            }
        }

        /// Cookie security wrapping session, like a real deployment.
        fn pipeline(&self) -> Pipeline {
            Pipeline::new()
                .with(Arc::new(CookieSecurityMiddleware::new(
                    CookieSecurityConfig::new(CookieProtection::Mac),
                    self.secrets.clone(),
                    self.container.clone(),
                )))
                .with(Arc::new(SessionMiddleware::new(
                    SessionConfig::default(),
                    self.backend.clone(),
                    self.container.clone(),
                )))
        }

        /// A handler that bumps a counter in section "cli" and reports it.
        fn counter_handler(&self) -> Arc<dyn Handler> {
            let container = self.container.clone();
            handler_fn(move |_req| {
                let container = container.clone();
                async move {
                    let session = container.resolve::<Session>()?;
                    let counter: i64 = session.get("cli", "counter").unwrap_or(0) + 1;
                    session.set("cli", "counter", counter)?;
                    Ok(counter.to_string().into_response())
                }
            })
        }

        async fn dispatch(
            &self,
            handler: Arc<dyn Handler>,
            sid: Option<&str>,
        ) -> Response {
            let mut builder = Request::builder().uri("http://localhost/cli");
            if let Some(sid) = sid {
                builder = builder.header(header::COOKIE, format!("{SESSION_COOKIE}={sid}"));
            }
            let request = builder.body(Body::empty()).unwrap();
            self.pipeline().dispatch(request, handler).await.unwrap()
        }
    }

    /// The encoded SID value from the response's Set-Cookie headers.
    fn outbound_sid(response: &Response) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|header| {
                let (first, _) = header.split_once(';').unwrap_or((header, ""));
                let (name, value) = first.split_once('=')?;
                (name == SESSION_COOKIE).then(|| value.to_string())
            })
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn counter_survives_three_requests_with_same_sid() {
        let harness = Harness::new();
        let handler = harness.counter_handler();

        let response = harness.dispatch(handler.clone(), None).await;
        let sid = outbound_sid(&response).expect("first response carries a new SID");
        assert_eq!(body_string(response).await, "1");

        let response = harness.dispatch(handler.clone(), Some(&sid)).await;
        // Resumed session: identifier unchanged, so no SID cookie again.
        assert!(outbound_sid(&response).is_none());
        assert_eq!(body_string(response).await, "2");

        let response = harness.dispatch(handler, Some(&sid)).await;
        assert_eq!(body_string(response).await, "3");
    }

    #[tokio::test]
    async fn tampered_sid_starts_a_fresh_session() {
        let harness = Harness::new();
        let handler = harness.counter_handler();

        let response = harness.dispatch(handler.clone(), None).await;
        let sid = outbound_sid(&response).unwrap();

        let tampered = format!("x{}", &sid[1..]);
        let response = harness.dispatch(handler, Some(&tampered)).await;

        // Signature check degraded the cookie; a new session began.
        assert!(outbound_sid(&response).is_some());
        assert_eq!(body_string(response).await, "1");
    }

    #[tokio::test]
    async fn untouched_session_schedules_no_cookie() {
        let harness = Harness::new();
        let handler = handler_fn(|_req| async move { Ok(StatusCode::OK.into_response()) });

        let response = harness.dispatch(handler, None).await;
        assert!(outbound_sid(&response).is_none());
        assert!(harness.backend.is_empty());
    }

    #[tokio::test]
    async fn destroyed_session_schedules_expired_cookie() {
        let harness = Harness::new();
        let handler = harness.counter_handler();

        let response = harness.dispatch(handler, None).await;
        let sid = outbound_sid(&response).unwrap();

        let container = harness.container.clone();
        let destroyer = handler_fn(move |_req| {
            let container = container.clone();
            async move {
                let session = container.resolve::<Session>()?;
                // Touch first so the inbound session is resumed.
                let _: Option<i64> = session.get("cli", "counter");
                session.destroy();
                Ok(StatusCode::OK.into_response())
            }
        });
        let response = harness.dispatch(destroyer, Some(&sid)).await;

        let header = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|h| h.starts_with(&format!("{SESSION_COOKIE}=")))
            .expect("destroy schedules a clearing cookie")
            .to_string();
        assert!(header.contains("Max-Age=0"));
        assert!(harness.backend.is_empty());
    }

    #[tokio::test]
    async fn session_scope_is_restored_even_when_handler_fails() {
        let harness = Harness::new();
        let handler = handler_fn(|_req| async move {
            Err(WeftError::Internal("handler blew up".to_string()))
        });

        let pipeline = Pipeline::new().with(Arc::new(SessionMiddleware::new(
            SessionConfig::default(),
            harness.backend.clone(),
            harness.container.clone(),
        )));
        let request = Request::builder()
            .uri("http://localhost/boom")
            .body(Body::empty())
            .unwrap();
        let result = pipeline.dispatch(request, handler).await;

        assert!(result.is_err());
        assert!(!harness.container.has(&ServiceId::of::<Session>()));
    }

    #[tokio::test]
    async fn standalone_session_middleware_renders_its_own_cookie() {
        let harness = Harness::new();
        let pipeline = Pipeline::new().with(Arc::new(SessionMiddleware::new(
            SessionConfig::default().with_lifetime(1200),
            harness.backend.clone(),
            harness.container.clone(),
        )));

        let container = harness.container.clone();
        let handler = handler_fn(move |_req| {
            let container = container.clone();
            async move {
                let session = container.resolve::<Session>()?;
                session.set("web", "seen", true)?;
                Ok(StatusCode::OK.into_response())
            }
        });

        let request = Request::builder()
            .uri("http://localhost/web")
            .body(Body::empty())
            .unwrap();
        let response = pipeline.dispatch(request, handler).await.unwrap();

        let sid_header = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(sid_header.starts_with(&format!("{SESSION_COOKIE}=")));
        assert!(sid_header.contains("Max-Age=1200"));
    }

    #[tokio::test]
    async fn nested_dispatch_restores_outer_session() {
        let harness = Harness::new();
        let backend = harness.backend.clone();
        let container = harness.container.clone();

        // Inner dispatch runs its own session middleware against the
        // same container; on unwind the outer session must be current
        // again.
        let inner_pipeline = Arc::new(Pipeline::new().with(Arc::new(SessionMiddleware::new(
            SessionConfig::default(),
            backend.clone(),
            container.clone(),
        ))));

        let outer_container = container.clone();
        let handler = handler_fn(move |_req| {
            let container = outer_container.clone();
            let inner_pipeline = inner_pipeline.clone();
            async move {
                let outer = container.resolve::<Session>()?;
                outer.set("cli", "who", "outer")?;
                let outer_id = outer.id().unwrap();

                let inner_container = container.clone();
                let inner_handler = handler_fn(move |_req| {
                    let container = inner_container.clone();
                    async move {
                        let inner = container.resolve::<Session>()?;
                        inner.set("cli", "who", "inner")?;
                        Ok(StatusCode::OK.into_response())
                    }
                });
                let sub_request = Request::builder()
                    .uri("http://localhost/sub")
                    .body(Body::empty())
                    .unwrap();
                inner_pipeline.dispatch(sub_request, inner_handler).await?;

                // Back to the outer session after the nested dispatch.
                let current = container.resolve::<Session>()?;
                assert_eq!(current.id().unwrap(), outer_id);
                let who: String = current.get("cli", "who").unwrap();
                assert_eq!(who, "outer");
                Ok(StatusCode::OK.into_response())
            }
        });

        let pipeline = Pipeline::new().with(Arc::new(SessionMiddleware::new(
            SessionConfig::default(),
            backend,
            container,
        )));
        let request = Request::builder()
            .uri("http://localhost/cli")
            .body(Body::empty())
            .unwrap();
        pipeline.dispatch(request, handler).await.unwrap();
    }
}
