use crate::domain::models::ToolErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            StoreError::NotFound(_) => ToolErrorKind::NotFound,
            StoreError::PermissionDenied(_) => ToolErrorKind::PermissionDenied,
            StoreError::ConstraintViolation(_) => ToolErrorKind::ConstraintViolation,
            StoreError::Connection(_) => ToolErrorKind::ConnectionError,
            StoreError::Other(_) => ToolErrorKind::UnknownError,
        }
    }

    /// Message safe to show the end user; the Display impl keeps the detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => {
                "The requested record was not found or you don't have access to it"
            }
            StoreError::PermissionDenied(_) => "You don't have permission to perform this action",
            StoreError::ConstraintViolation(_) => {
                "This operation violates data integrity rules. Please check your input."
            }
            StoreError::Connection(_) => "Database connection issue. Please try again.",
            StoreError::Other(_) => "An unexpected database error occurred",
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("AI service error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("AI service unreachable: {0}")]
    Transport(String),

    #[error("AI service returned an invalid response: {0}")]
    Decode(String),

    #[error("AI service returned a response without a message")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Upstream(#[from] ModelError),

    #[error("Request timeout: AI service took longer than {0}s to respond")]
    Timeout(u64),

    #[error("Exceeded the maximum of {0} tool rounds without a final answer")]
    MaxTurnsExceeded(usize),

    #[error("Failed to load user settings: {0}")]
    Store(#[from] StoreError),
}

impl AgentError {
    pub fn error_type(&self) -> &'static str {
        match self {
            AgentError::Upstream(_) => "upstream_error",
            AgentError::Timeout(_) => "timeout",
            AgentError::MaxTurnsExceeded(_) => "max_turns_exceeded",
            AgentError::Store(_) => "store_error",
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
