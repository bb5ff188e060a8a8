//! Engine error taxonomy

use slide_forge_sdk::CollaboratorError;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Model output did not match the requested schema
    #[error("model output failed `{schema}` validation: {message}")]
    SchemaValidation { schema: String, message: String },

    /// Reviewer found no artifact under the step's key
    #[error("Missing artifact for {role} ({key})")]
    ArtifactMissing { role: String, key: String },

    /// Model, image, storage or search collaborator failed
    #[error("external service error: {0}")]
    ExternalService(#[from] CollaboratorError),

    #[error("Failed criteria after {retries} retries. Last feedback: {feedback}")]
    RetryLimitExceeded { retries: u32, feedback: String },

    #[error(
        "System Stopped: Unable to complete task after {attempts} replanning attempts. Last error: {last_error}"
    )]
    ReplanningLimitExceeded { attempts: u32, last_error: String },

    #[error("client disconnected")]
    ClientDisconnected,

    #[error("session `{0}` already has an active run")]
    SessionBusy(String),

    #[error("recursion limit of {0} reached")]
    RecursionLimit(usize),

    #[error("checkpoint store error: {0}")]
    Checkpoint(#[from] StorageError),

    #[error("invalid workflow state: {0}")]
    InvalidState(String),

    #[error("a turn needs at least one message")]
    EmptyInput,

    #[error("invalid setting {key}={value}: {reason}")]
    InvalidSetting {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl EngineError {
    pub fn schema(schema: impl Into<String>, message: impl ToString) -> Self {
        Self::SchemaValidation {
            schema: schema.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
