//! # Weft
//!
//! A service container and HTTP middleware pipeline for Rust.
//!
//! Weft threads two things through a request: a dependency-injection
//! [`Container`] with named bindings, auto-wiring descriptors and
//! request-scoped overrides, and a [`middleware::Pipeline`] of async
//! middleware in the onion style. On top of the pipeline it ships
//! cookie protection (AES-256-GCM encryption or HMAC-SHA256 signing)
//! and lazy server-side sessions.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use weft::{Container, ServiceId, arg};
//! use weft::config::{CookieProtection, CookieSecurityConfig, SessionConfig};
//! use weft::crypto::SecretService;
//! use weft::middleware::{handler_fn, CookieSecurityMiddleware, Pipeline, SessionMiddleware};
//! use weft::session::{MemorySessionBackend, Session};
//! use axum::response::IntoResponse;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> weft::Result<()> {
//! let container = Container::new();
//! let secrets = Arc::new(SecretService::new(SecretService::generate_key())?);
//! let backend = Arc::new(MemorySessionBackend::new(Duration::from_secs(3600)));
//!
//! let pipeline = Pipeline::new()
//!     .with(Arc::new(CookieSecurityMiddleware::new(
//!         CookieSecurityConfig::new(CookieProtection::Encrypt),
//!         secrets,
//!         container.clone(),
//!     )))
//!     .with(Arc::new(SessionMiddleware::new(
//!         SessionConfig::default(),
//!         backend,
//!         container.clone(),
//!     )));
//!
//! let handler = handler_fn(move |_req| {
//!     let container = container.clone();
//!     async move {
//!         let session = container.resolve::<Session>()?;
//!         session.set("auth", "visits", 1)?;
//!         Ok("hello".into_response())
//!     }
//! });
//! # let _ = (pipeline, handler);
//! # Ok(())
//! # }
//! ```
//!
//! For axum integration, [`middleware::Pipeline::into_layer`] turns the
//! pipeline into a [`tower::Layer`] applicable to any router.

pub mod config;
pub mod cookie;
pub mod crypto;
pub mod di;
pub mod error;
pub mod middleware;
pub mod session;

pub use di::{
    arg, arg_arc, downcast_arg, ArgValue, BindingEntry, Callable, Container, ContainerBuilder,
    BindingId, HasContainer, Inject, InjectNamed, Overrides, ParamSpec, Resolution, ResolvedArgs,
    ScopeGuard, ServiceId,
};
pub use error::{Result, WeftError};

/// The common imports for application code.
pub mod prelude {
    pub use crate::config::{CookieProtection, CookieSecurityConfig, SessionConfig};
    pub use crate::cookie::{Cookie, CookieJar};
    pub use crate::crypto::SecretService;
    pub use crate::di::{arg, Container, ContainerBuilder, Inject, Overrides, ServiceId};
    pub use crate::error::{Result, WeftError};
    pub use crate::middleware::{
        handler_fn, CookieSecurityMiddleware, Middleware, Next, Pipeline, SessionMiddleware,
    };
    pub use crate::session::{MemorySessionBackend, Session, SessionBackend};
}
