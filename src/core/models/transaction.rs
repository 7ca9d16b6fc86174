use crate::core::errors::AccountingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Pending,
    Confirmed,
    Cancelled,
    Committed,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Cancelled | TransactionState::Committed)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionState::Pending => "pending",
            TransactionState::Confirmed => "confirmed",
            TransactionState::Cancelled => "cancelled",
            TransactionState::Committed => "committed",
        };
        write!(f, "{}", s)
    }
}

/// A payment intent that needs a quorum of participant confirmations before settlement.
///
/// At most one of `confirmed_at`, `cancelled_at` and `committed_at` is set. The markers are
/// only ever changed through the `mark_*` methods, which follow the lifecycle
/// Pending -> Confirmed -> Committed, with Cancelled reachable from the first two.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Transaction {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub description: String,
    pub amount: i64,
    #[serde(with = "hex::serde")]
    #[schema(value_type = String, example = "5fbdb2315678afecb367f032d93f642f64180aa3")]
    pub destination: Vec<u8>,
    pub max_fee_allowed: i64,
    #[schema(value_type = String)]
    pub deadline: DateTime<Utc>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
    #[schema(value_type = Option<String>)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub committed_at: Option<DateTime<Utc>>,
    pub settlement_reference: Option<String>,
    pub version: u64,
}

impl Transaction {
    pub fn state(&self) -> TransactionState {
        if self.committed_at.is_some() {
            TransactionState::Committed
        } else if self.cancelled_at.is_some() {
            TransactionState::Cancelled
        } else if self.confirmed_at.is_some() {
            TransactionState::Confirmed
        } else {
            TransactionState::Pending
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    fn invalid_state(&self, reason: &str) -> AccountingError {
        AccountingError::InvalidState(self.id.to_string(), self.state().to_string(), reason.to_string())
    }

    pub fn mark_confirmed(&mut self, now: DateTime<Utc>) -> Result<(), AccountingError> {
        if self.state() != TransactionState::Pending {
            return Err(self.invalid_state("only pending transactions can be confirmed"));
        }
        if self.is_expired(now) {
            return Err(self.invalid_state("deadline has passed"));
        }
        self.confirmed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) -> Result<(), AccountingError> {
        match self.state() {
            TransactionState::Pending | TransactionState::Confirmed => {
                self.confirmed_at = None;
                self.cancelled_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
            TransactionState::Cancelled | TransactionState::Committed => {
                Err(self.invalid_state("terminal transactions cannot be cancelled"))
            }
        }
    }

    pub fn mark_committed(&mut self, now: DateTime<Utc>, reference: Option<String>) -> Result<(), AccountingError> {
        if self.state() != TransactionState::Confirmed {
            return Err(self.invalid_state("only confirmed transactions can be committed"));
        }
        if self.is_expired(now) {
            return Err(self.invalid_state("deadline has passed"));
        }
        self.confirmed_at = None;
        self.committed_at = Some(now);
        self.settlement_reference = reference;
        self.updated_at = now;
        Ok(())
    }

    fn markers_set(&self) -> usize {
        [self.confirmed_at, self.cancelled_at, self.committed_at]
            .iter()
            .filter(|m| m.is_some())
            .count()
    }

    /// Checks the invariants every persisted transaction must hold.
    pub fn check_invariants(&self) -> Result<(), AccountingError> {
        if self.amount <= 0 {
            return Err(AccountingError::invalid_input(
                "amount",
                "Invalid Amount",
                "Amount must be greater than 0",
            ));
        }
        if self.max_fee_allowed < 0 {
            return Err(AccountingError::invalid_input(
                "max_fee_allowed",
                "Invalid Fee",
                "Maximum fee cannot be negative",
            ));
        }
        if self.deadline <= self.created_at {
            return Err(AccountingError::invalid_input(
                "deadline",
                "Invalid Deadline",
                "Deadline must be after creation time",
            ));
        }
        if self.markers_set() > 1 {
            return Err(self.invalid_state("more than one terminal marker set"));
        }
        Ok(())
    }
}

/// One participant's vote on a transaction. Unique per (transaction, user).
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TransactionConfirmation {
    pub transaction_id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub confirmed: bool,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}
