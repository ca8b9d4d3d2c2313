mod jar;

pub use jar::CookieJar;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Octets RFC 6265 forbids in a cookie value, escaped when rendering.
const COOKIE_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b',')
    .add(b';')
    .add(b'\\')
    .add(b'%');

/// Cookie names additionally may not contain `=`.
const COOKIE_NAME: &AsciiSet = &COOKIE_VALUE.add(b'=');

/// Cookie name reserved for the session identifier.
pub const SESSION_COOKIE: &str = "SID";

/// Cookie name reserved for the CSRF token. Always excluded from the
/// encryption/signing layer so CSRF middleware can inspect it.
pub const CSRF_TOKEN_COOKIE: &str = "CSRF_TOKEN";

/// An immutable cookie value object.
///
/// `with_*` methods produce modified copies; nothing mutates in place.
/// Header rendering is a pure function of the fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    max_age: Option<u64>,
    path: Option<String>,
    domain: Option<String>,
    secure: Option<bool>,
    http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            path: None,
            domain: None,
            secure: None,
            http_only: true,
        }
    }

    /// A cookie that clears its client-side counterpart: empty value,
    /// already-expired lifetime.
    pub fn expired(name: impl Into<String>) -> Self {
        Self::new(name, "").with_max_age(0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn max_age(&self) -> Option<u64> {
        self.max_age
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// `None` means "defer to the deployment default" (whether the
    /// request arrived over a secure transport).
    pub fn secure(&self) -> Option<bool> {
        self.secure
    }

    pub fn http_only(&self) -> bool {
        self.http_only
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Render a `Set-Cookie` header value. Name and value octets the
    /// cookie grammar forbids are percent-encoded; [`parse_cookie_header`]
    /// reverses the escaping.
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!(
            "{}={}",
            utf8_percent_encode(&self.name, COOKIE_NAME),
            utf8_percent_encode(&self.value, COOKIE_VALUE)
        )];

        if let Some(path) = &self.path {
            parts.push(format!("Path={}", path));
        }
        if let Some(domain) = &self.domain {
            parts.push(format!("Domain={}", domain));
        }
        if let Some(max_age) = self.max_age {
            parts.push(format!("Max-Age={}", max_age));
        }
        if self.secure == Some(true) {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }

        parts.join("; ")
    }
}

/// Parse a request `Cookie` header into name/value pairs, undoing the
/// percent-escaping applied by [`Cookie::to_header_value`].
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for cookie in header.split(';') {
        let parts: Vec<&str> = cookie.trim().splitn(2, '=').collect();
        if parts.len() == 2 && !parts[0].is_empty() {
            pairs.push((
                percent_decode_str(parts[0]).decode_utf8_lossy().into_owned(),
                percent_decode_str(parts[1]).decode_utf8_lossy().into_owned(),
            ));
        }
    }
    pairs
}
