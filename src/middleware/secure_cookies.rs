use crate::config::{CookieProtection, CookieSecurityConfig};
use crate::cookie::{parse_cookie_header, Cookie, CookieJar};
use crate::crypto::SecretService;
use crate::di::{arg, Container, ServiceId};
use crate::error::WeftError;
use crate::middleware::{Middleware, MiddlewareResult, Next};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
};
use std::collections::HashMap;
use std::sync::Arc;

/// Authenticates inbound cookie values and protects outbound ones.
///
/// On entry every non-excluded inbound cookie is decoded according to
/// the configured [`CookieProtection`]; a value that fails its check is
/// degraded to absent rather than aborting the request. The decoded
/// [`CookieJar`] is placed in the request extensions and scope-bound
/// into the container so nested resolution sees the current jar.
///
/// On exit every cookie scheduled in the jar is encoded with the
/// inverse transform and attached as a `Set-Cookie` header, with
/// unset attributes defaulted from the configuration and the request
/// (secure follows the inbound transport, domain follows the `%s`
/// pattern). Encoding failures are fatal.
pub struct CookieSecurityMiddleware {
    config: CookieSecurityConfig,
    secrets: Arc<SecretService>,
    container: Container,
}

impl CookieSecurityMiddleware {
    pub fn new(
        config: CookieSecurityConfig,
        secrets: Arc<SecretService>,
        container: Container,
    ) -> Self {
        Self {
            config,
            secrets,
            container,
        }
    }

    fn decode(&self, value: &str) -> crate::error::Result<String> {
        match self.config.method {
            CookieProtection::None => Ok(value.to_string()),
            CookieProtection::Encrypt => self.secrets.decrypt(value),
            CookieProtection::Mac => self.secrets.verify(value),
        }
    }

    fn encode(&self, value: &str) -> crate::error::Result<String> {
        match self.config.method {
            CookieProtection::None => Ok(value.to_string()),
            CookieProtection::Encrypt => self.secrets.encrypt(value),
            CookieProtection::Mac => self.secrets.sign(value),
        }
    }

    /// Fill in attributes the scheduler left unset.
    fn apply_defaults(
        &self,
        cookie: Cookie,
        host: Option<&str>,
        secure_transport: bool,
    ) -> Cookie {
        let mut cookie = cookie;
        if cookie.path().is_none() {
            cookie = cookie.with_path(self.config.path.clone());
        }
        if cookie.domain().is_none()
            && let Some(domain) = self.config.resolve_domain(host)
        {
            cookie = cookie.with_domain(domain);
        }
        if cookie.secure().is_none() {
            cookie = cookie.with_secure(secure_transport);
        }
        if cookie.max_age().is_none() && self.config.lifetime > 0 {
            cookie = cookie.with_max_age(self.config.lifetime);
        }
        cookie
    }
}

fn request_host(request: &Request<Body>) -> Option<String> {
    if let Some(host) = request.uri().host() {
        return Some(host.to_string());
    }
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| h.split(':').next().unwrap_or(h).to_string())
}

#[async_trait]
impl Middleware for CookieSecurityMiddleware {
    async fn handle(&self, mut request: Request<Body>, next: Next) -> MiddlewareResult {
        let secure_transport = request.uri().scheme_str() == Some("https");
        let host = request_host(&request);

        let mut inbound = HashMap::new();
        if let Some(raw) = request
            .headers()
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
        {
            for (name, value) in parse_cookie_header(raw) {
                let decoded = if self.config.is_excluded(&name) {
                    Some(value)
                } else {
                    match self.decode(&value) {
                        Ok(decoded) => Some(decoded),
                        Err(err) if err.is_recoverable() => {
                            tracing::warn!(cookie = %name, error = %err, "dropping inbound cookie");
                            None
                        }
                        Err(err) => return Err(err),
                    }
                };
                inbound.insert(name, decoded);
            }
        }

        let jar = CookieJar::from_decoded(inbound);
        request.extensions_mut().insert(jar.clone());
        let _scope = self
            .container
            .scoped(ServiceId::of::<CookieJar>(), arg(jar.clone()));

        let mut response = next.run(request).await?;

        for cookie in jar.take_outbound() {
            let cookie = if self.config.is_excluded(cookie.name()) {
                cookie
            } else {
                let encoded = self.encode(cookie.value())?;
                cookie.with_value(encoded)
            };
            let cookie = self.apply_defaults(cookie, host.as_deref(), secure_transport);

            let header_value = HeaderValue::from_str(&cookie.to_header_value())
                .map_err(|e| WeftError::Internal(format!("invalid Set-Cookie header: {e}")))?;
            response.headers_mut().append(header::SET_COOKIE, header_value);
        }

        Ok(response)
    }
}
