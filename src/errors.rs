use thiserror::Error;

/// Failures from the DeepSeek-compatible provider API.
///
/// The variants separate "could not reach the service" from "the service
/// answered with garbage" so callers can pick the right degradation path
/// without inspecting log text.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out: {0}")]
    Timeout(String),
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    #[error("provider returned status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("provider returned no usable content")]
    EmptyResponse,
}

impl ProviderError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else {
            ProviderError::Unreachable(err.to_string())
        }
    }

    pub fn malformed<E: std::fmt::Display>(err: E) -> Self {
        ProviderError::MalformedResponse(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("session error: {0}")]
    Session(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        EngineError::Internal(err.to_string())
    }
}
