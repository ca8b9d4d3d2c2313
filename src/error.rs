use thiserror::Error;

pub type Result<T> = std::result::Result<T, WeftError>;

#[derive(Debug, Error)]
pub enum WeftError {
    #[error("Binding not found: {id}")]
    NotFound { id: String },

    #[error("Failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("Cannot resolve parameter '{parameter}' of {target}")]
    UnresolvableParameter { parameter: String, target: String },

    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    #[error("Circular alias chain at '{id}' (depth limit {limit})")]
    CircularAlias { id: String, limit: usize },

    #[error("Scope mismatch: {message}")]
    ScopeMismatch { message: String },

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WeftError {
    /// Whether the error may be absorbed at cookie granularity instead of
    /// aborting the request. Only inbound cookie authentication failures
    /// qualify; everything else propagates.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WeftError::Decryption(_))
    }
}

impl From<std::convert::Infallible> for WeftError {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

impl axum::response::IntoResponse for WeftError {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
        (status, self.to_string()).into_response()
    }
}
