//! Typed configuration for the cookie security and session layers.

use crate::cookie::CSRF_TOKEN_COOKIE;
use std::collections::HashSet;

/// Protection applied to non-excluded cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CookieProtection {
    /// Pass values through untouched.
    #[default]
    None,
    /// Authenticated encryption; values are unreadable without the key.
    Encrypt,
    /// Appended keyed-hash signature; values stay readable.
    Mac,
}

/// Options consumed by the cookie security middleware.
///
/// `domain` is a pattern with one `%s` placeholder substituted with the
/// request host (`"%s"` = current host only, `".%s"` = host plus
/// subdomains) or a literal to force a fixed domain. `None` omits the
/// attribute entirely.
#[derive(Debug, Clone)]
pub struct CookieSecurityConfig {
    pub method: CookieProtection,
    pub path: String,
    pub domain: Option<String>,
    /// Default Max-Age in seconds for scheduled cookies that do not set
    /// their own.
    pub lifetime: u64,
    exclude: HashSet<String>,
}

impl CookieSecurityConfig {
    pub fn new(method: CookieProtection) -> Self {
        let mut exclude = HashSet::new();
        // The CSRF middleware must be able to read its token.
        exclude.insert(CSRF_TOKEN_COOKIE.to_string());
        Self {
            method,
            path: "/".to_string(),
            domain: None,
            lifetime: 0,
            exclude,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_domain(mut self, pattern: impl Into<String>) -> Self {
        self.domain = Some(pattern.into());
        self
    }

    pub fn with_lifetime(mut self, seconds: u64) -> Self {
        self.lifetime = seconds;
        self
    }

    /// Exclude a cookie name from protection in both directions.
    pub fn with_excluded(mut self, name: impl Into<String>) -> Self {
        self.exclude.insert(name.into());
        self
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude.contains(name)
    }

    /// Resolve the `Domain` attribute for the current request host.
    pub fn resolve_domain(&self, host: Option<&str>) -> Option<String> {
        let pattern = self.domain.as_deref()?;
        if pattern.contains("%s") {
            host.map(|h| pattern.replace("%s", h))
        } else {
            Some(pattern.to_string())
        }
    }
}

impl Default for CookieSecurityConfig {
    fn default() -> Self {
        Self::new(CookieProtection::default())
    }
}

/// Options consumed by the session middleware.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cookie carrying the session identifier.
    pub cookie_name: String,
    /// Max-Age of the identifier cookie in seconds. `None` issues a
    /// browser-session cookie.
    pub lifetime: Option<u64>,
}

impl SessionConfig {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            lifetime: None,
        }
    }

    pub fn with_lifetime(mut self, seconds: u64) -> Self {
        self.lifetime = Some(seconds);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(crate::cookie::SESSION_COOKIE)
    }
}
