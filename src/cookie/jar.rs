use crate::cookie::Cookie;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

struct JarInner {
    /// Decoded inbound cookies. `None` marks a cookie whose protection
    /// check failed; it reads as absent.
    inbound: HashMap<String, Option<String>>,
    /// Outbound cookies scheduled during the request, in insertion order.
    outbound: Vec<Cookie>,
}

/// Per-request cookie jar: the authenticated inbound view plus the
/// outbound schedule.
///
/// Cheap to clone; clones share the same jar. The cookie security
/// middleware creates one per request, scope-binds it into the
/// container and drains the outbound schedule on the way out.
#[derive(Clone)]
pub struct CookieJar {
    inner: Arc<RwLock<JarInner>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::from_decoded(HashMap::new())
    }

    /// Build a jar from already-decoded inbound values.
    pub fn from_decoded(inbound: HashMap<String, Option<String>>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(JarInner {
                inbound,
                outbound: Vec::new(),
            })),
        }
    }

    /// The decoded value of an inbound cookie. A cookie that failed
    /// authentication reads as absent.
    pub fn get(&self, name: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.inbound.get(name).cloned().flatten()
    }

    /// Whether the inbound request carried the cookie at all, decoded
    /// or not.
    pub fn was_received(&self, name: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.inbound.contains_key(name)
    }

    /// Schedule an outbound cookie. Scheduling the same name again
    /// replaces the earlier entry.
    pub fn set(&self, cookie: Cookie) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.outbound.retain(|c| c.name() != cookie.name());
        inner.outbound.push(cookie);
    }

    /// Schedule a cookie that clears its client-side counterpart.
    pub fn expire(&self, name: &str) {
        self.set(Cookie::expired(name));
    }

    /// Drain the outbound schedule, preserving insertion order.
    pub fn take_outbound(&self) -> Vec<Cookie> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut inner.outbound)
    }

    pub fn outbound_len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.outbound.len()
    }
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_inbound_cookie_reads_as_absent() {
        let mut inbound = HashMap::new();
        inbound.insert("good".to_string(), Some("v".to_string()));
        inbound.insert("bad".to_string(), None);
        let jar = CookieJar::from_decoded(inbound);

        assert_eq!(jar.get("good").as_deref(), Some("v"));
        assert_eq!(jar.get("bad"), None);
        assert!(jar.was_received("bad"));
        assert!(!jar.was_received("missing"));
    }

    #[test]
    fn scheduling_same_name_replaces() {
        let jar = CookieJar::new();
        jar.set(Cookie::new("SID", "first"));
        jar.set(Cookie::new("theme", "dark"));
        jar.set(Cookie::new("SID", "second"));

        let outbound = jar.take_outbound();
        assert_eq!(outbound.len(), 2);
        assert_eq!(outbound[0].name(), "theme");
        assert_eq!(outbound[1].value(), "second");
    }

    #[test]
    fn take_outbound_drains() {
        let jar = CookieJar::new();
        jar.set(Cookie::new("a", "1"));
        assert_eq!(jar.take_outbound().len(), 1);
        assert_eq!(jar.outbound_len(), 0);
    }

    #[test]
    fn clones_share_state() {
        let jar = CookieJar::new();
        let other = jar.clone();
        other.set(Cookie::new("a", "1"));
        assert_eq!(jar.outbound_len(), 1);
    }
}
