use thiserror::Error;

#[derive(Error, Debug)]
pub enum CullerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Rule group not found: {0}")]
    RuleGroupNotFound(i64),

    #[error("Collection not found: {0}")]
    CollectionNotFound(i64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

/// Failure of a call into one of the external capability providers.
///
/// Provider failures are never retried by the core; callers either treat
/// them as "unresolved" (value resolution) or as a per-group failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },

    #[error("{service} request failed: {message}")]
    Request {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned unexpected data: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error("{service} does not support {operation}")]
    Unsupported {
        service: &'static str,
        operation: &'static str,
    },
}

impl ProviderError {
    pub fn request(service: &'static str, message: impl Into<String>) -> Self {
        Self::Request {
            service,
            message: message.into(),
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
