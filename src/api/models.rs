use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::core::{
    errors::{AccountingError, ErrorKind},
    models::{
        organization::{QuorumPolicy, Role},
        transaction::{Transaction, TransactionConfirmation, TransactionState},
        user::UserView,
    },
    quorum::QuorumStatus,
};

// Request structs for JSON payloads
#[derive(Deserialize, ToSchema)]
pub struct JoinRequest {
    /// Hex encoded seed, with or without `0x`.
    pub seed: String,
    pub mnemonic: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub seed: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateOrganizationRequest {
    pub name: String,
    #[serde(default)]
    pub quorum: QuorumPolicy,
}

#[derive(Deserialize, ToSchema)]
pub struct AddParticipantRequest {
    pub user_id: Uuid,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Employee
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateQuorumRequest {
    pub quorum: QuorumPolicy,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    pub description: String,
    pub amount: i64,
    /// Hex encoded destination address.
    pub destination: String,
    #[serde(default)]
    pub max_fee_allowed: i64,
    #[schema(value_type = String)]
    pub deadline: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct VoteRequest {
    pub approve: bool,
}

#[derive(Serialize, ToSchema)]
pub struct TransactionResponse {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub state: TransactionState,
}

impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        TransactionResponse {
            state: transaction.state(),
            transaction,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct VoteResponse {
    pub transaction: TransactionResponse,
    pub quorum: QuorumStatus,
}

#[derive(Serialize, ToSchema)]
pub struct ConfirmationsResponse {
    pub confirmations: Vec<TransactionConfirmation>,
    pub quorum: QuorumStatus,
}

#[derive(Serialize, ToSchema)]
pub struct SalariesResponse {
    pub address: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

pub struct ApiError(pub AccountingError);

impl From<AccountingError> for ApiError {
    fn from(err: AccountingError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::SettlementRejected | ErrorKind::InvalidResponse => StatusCode::BAD_GATEWAY,
        ErrorKind::SettlementUnavailable => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(error = %self.0, kind = kind.as_str(), "request failed");
        }
        let error_message = match &self.0 {
            AccountingError::InvalidInput(_, field) => format!("{}: {}", field.title, field.description),
            other => other.to_string(),
        };
        (
            status,
            Json(ErrorResponse {
                error: error_message,
                kind: kind.as_str().to_string(),
            }),
        )
            .into_response()
    }
}
