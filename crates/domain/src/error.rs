/// Shared error type used across all workspace crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("auth required: {0}")]
    AuthRequired(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited")]
    RateLimited,

    #[error("upstream: {0}")]
    Upstream(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("circuit open")]
    CircuitOpen,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
