use thiserror::Error;

/// Failure of a single model call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Network failure, rate limit or server-side error. Worth retrying.
    #[error("transient model error: {0}")]
    Transient(String),

    #[error("model error: {0}")]
    Permanent(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelError::Transient(_))
    }
}

/// Cache storage is unreachable or refused an operation.
#[derive(Debug, Clone, Error)]
#[error("cache storage error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("render error: {0}")]
    Render(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
