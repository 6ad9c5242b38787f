use thiserror::Error;

/// Core error types for reference and identifier handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("Invalid resource id: {0}")]
    InvalidId(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Invalid request url: {0}")]
    InvalidRequestUrl(String),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl CoreError {
    /// Create a new InvalidResourceType error
    pub fn invalid_resource_type(resource_type: impl Into<String>) -> Self {
        Self::InvalidResourceType(resource_type.into())
    }

    /// Create a new InvalidId error
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    /// Create a new InvalidReference error
    pub fn invalid_reference(reason: impl Into<String>) -> Self {
        Self::InvalidReference(reason.into())
    }

    /// Create a new InvalidRequestUrl error
    pub fn invalid_request_url(reason: impl Into<String>) -> Self {
        Self::InvalidRequestUrl(reason.into())
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
