use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub title: String,
    pub description: String,
}

impl FieldError {
    pub fn new(field: &str, title: impl Into<String>, description: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Coarse classification of [`AccountingError`] used by boundary layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    Unauthenticated,
    Unauthorized,
    InvalidState,
    SettlementUnavailable,
    SettlementRejected,
    InvalidResponse,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::SettlementUnavailable => "SETTLEMENT_UNAVAILABLE",
            ErrorKind::SettlementRejected => "SETTLEMENT_REJECTED",
            ErrorKind::InvalidResponse => "INVALID_RESPONSE",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

#[derive(Error, Debug, Clone, Serialize)]
pub enum AccountingError {
    #[error("Invalid input for field `{0}`: {1:?}")]
    InvalidInput(String, FieldError),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("User {0} is not authorized to {1}")]
    Unauthorized(String, String),
    #[error("User {0} is not an active participant of organization {1}")]
    NotParticipant(String, String),
    #[error("Transaction {0} is {1}: {2}")]
    InvalidState(String, String, String),
    #[error("Organization {0}: {1}")]
    InvalidOrganizationState(String, String),
    #[error("Settlement service unavailable: {0}")]
    SettlementUnavailable(String),
    #[error("Settlement service rejected the request with status {status}: {message}")]
    SettlementRejected { status: u16, message: String },
    #[error("Invalid settlement service response: {0}")]
    InvalidResponse(String),
    #[error("User {0} not found")]
    UserNotFound(String),
    #[error("Organization {0} not found")]
    OrganizationNotFound(String),
    #[error("Transaction {0} not found")]
    TransactionNotFound(String),
    #[error("Participant {0} not found in organization {1}")]
    ParticipantNotFound(String, String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Logging error: {0}")]
    LoggingError(String),
    #[error("Cache error: {0}")]
    CacheError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AccountingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountingError::InvalidInput(..) => ErrorKind::InvalidInput,
            AccountingError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            AccountingError::Unauthorized(..) | AccountingError::NotParticipant(..) => ErrorKind::Unauthorized,
            AccountingError::InvalidState(..) | AccountingError::InvalidOrganizationState(..) => {
                ErrorKind::InvalidState
            }
            AccountingError::SettlementUnavailable(_) => ErrorKind::SettlementUnavailable,
            AccountingError::SettlementRejected { .. } => ErrorKind::SettlementRejected,
            AccountingError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            AccountingError::UserNotFound(_)
            | AccountingError::OrganizationNotFound(_)
            | AccountingError::TransactionNotFound(_)
            | AccountingError::ParticipantNotFound(..) => ErrorKind::NotFound,
            AccountingError::Conflict(_) => ErrorKind::Conflict,
            AccountingError::StorageError(_)
            | AccountingError::LoggingError(_)
            | AccountingError::CacheError(_)
            | AccountingError::InternalServerError(_) => ErrorKind::Internal,
        }
    }

    /// Only transport-level settlement failures may be retried without re-deriving state.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::SettlementUnavailable
    }

    pub fn invalid_input(field: &str, title: impl Into<String>, description: impl Into<String>) -> Self {
        AccountingError::InvalidInput(field.to_string(), FieldError::new(field, title, description))
    }
}
