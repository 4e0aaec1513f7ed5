use uuid::Uuid;

/// Shared error type used across all AgentHub crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("tool {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error is worth retrying under an activity retry policy.
    ///
    /// Network failures, timeouts, rate limits, and 5xx-class provider
    /// responses are transient; everything else (auth failures, unknown
    /// models, validation) is permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Timeout(_) | Error::RateLimited(_) | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(Error::Http("502".into()).is_retryable());
        assert!(Error::Timeout("llm".into()).is_retryable());
        assert!(Error::RateLimited("429".into()).is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!Error::Auth("bad key".into()).is_retryable());
        assert!(!Error::Provider {
            provider: "openai".into(),
            message: "model not found".into()
        }
        .is_retryable());
        assert!(!Error::AgentNotFound(Uuid::nil()).is_retryable());
    }
}
