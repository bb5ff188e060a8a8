use thiserror::Error;

/// Error returned by every collaborator call (model, image, storage, search).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The remote service failed or was unreachable
    #[error("{service} request failed: {message}")]
    Service {
        service: &'static str,
        message: String,
    },

    /// The service answered, but the payload was unusable
    #[error("invalid response from {service}: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    /// Object store lookup miss
    #[error("object not found: {0}")]
    NotFound(String),
}

impl CollaboratorError {
    pub fn service(service: &'static str, message: impl Into<String>) -> Self {
        Self::Service {
            service,
            message: message.into(),
        }
    }

    pub fn invalid_response(service: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for collaborator operations
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;
