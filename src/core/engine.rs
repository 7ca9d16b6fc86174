//! Transaction lifecycle and confirmation quorum.
//!
//! `AuthorizationEngine` is the only component that changes a transaction's state. Each
//! mutating operation holds the transaction's lock for its whole read-evaluate-write
//! sequence and persists through one [`ChangeSet`], so no reader ever sees a vote counted
//! without the matching state, or the other way round.

use crate::auth::identity::CallerIdentity;
use crate::core::constants::{
    CONFIRMATION_RECORDED, COMMIT_FAILED, MAX_DESCRIPTION_LENGTH, TRANSACTION_CANCELLED, TRANSACTION_COMMITTED,
    TRANSACTION_CONFIRMED, TRANSACTION_CREATED, TRANSACTION_EXPIRED,
};
use crate::core::errors::AccountingError;
use crate::core::locks::KeyedLocks;
use crate::core::models::{
    audit::OrganizationAudit,
    organization::{Organization, OrganizationParticipant},
    transaction::{Transaction, TransactionConfirmation, TransactionState},
};
use crate::core::quorum::{self, QuorumStatus};
use crate::core::time::TimeSource;
use crate::infrastructure::logging::LoggingService;
use crate::infrastructure::settlement::SettlementGateway;
use crate::infrastructure::settlement::types::CommitTransactionRequest;
use crate::infrastructure::storage::{ChangeSet, Storage};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Input for [`AuthorizationEngine::create_transaction`].
#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub description: String,
    pub amount: i64,
    pub destination: Vec<u8>,
    pub max_fee_allowed: i64,
    pub deadline: DateTime<Utc>,
}

/// Result of recording a vote.
#[derive(Clone, Debug)]
pub struct ConfirmationOutcome {
    pub transaction: Transaction,
    pub quorum: QuorumStatus,
    /// True when this vote moved the transaction from Pending to Confirmed.
    pub became_confirmed: bool,
}

pub struct AuthorizationEngine<S: Storage, G: SettlementGateway, L: LoggingService> {
    storage: Arc<S>,
    gateway: Arc<G>,
    logging: Arc<L>,
    clock: Arc<dyn TimeSource>,
    locks: KeyedLocks,
}

impl<S: Storage, G: SettlementGateway, L: LoggingService> AuthorizationEngine<S, G, L> {
    pub fn new(storage: Arc<S>, gateway: Arc<G>, logging: Arc<L>, clock: Arc<dyn TimeSource>) -> Self {
        AuthorizationEngine {
            storage,
            gateway,
            logging,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    async fn log_and_audit(
        &self,
        organization_id: Uuid,
        action: &str,
        details: serde_json::Value,
        user_id: Option<Uuid>,
    ) -> Result<(), AccountingError> {
        let user_id = user_id.map(|id| id.to_string());
        self.logging
            .log_action(action, details.clone(), user_id.as_deref())
            .await?;
        self.storage
            .save_organization_audit(OrganizationAudit {
                id: Uuid::new_v4().to_string(),
                organization_id: organization_id.to_string(),
                action: action.to_string(),
                user_id,
                details: serde_json::from_value(details).unwrap_or_default(),
                timestamp: self.clock.now(),
            })
            .await
    }

    /// Records an action whose outcome is already final. A failed audit write is logged
    /// and never replaces that outcome.
    async fn audit(&self, organization_id: Uuid, action: &str, details: serde_json::Value, user_id: Option<Uuid>) {
        if let Err(err) = self.log_and_audit(organization_id, action, details, user_id).await {
            warn!(action, error = %err, "audit write failed");
        }
    }

    async fn require_organization(&self, organization_id: Uuid) -> Result<Organization, AccountingError> {
        self.storage
            .get_organization(organization_id)
            .await?
            .ok_or_else(|| AccountingError::OrganizationNotFound(organization_id.to_string()))
    }

    async fn require_active_participant(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrganizationParticipant, AccountingError> {
        match self.storage.get_participant(organization_id, user_id).await? {
            Some(participant) if !participant.has_left() => Ok(participant),
            _ => Err(AccountingError::NotParticipant(
                user_id.to_string(),
                organization_id.to_string(),
            )),
        }
    }

    /// Loads a transaction addressed through `organization_id`. A transaction of another
    /// organization is reported as missing.
    async fn load_transaction(
        &self,
        organization_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, AccountingError> {
        match self.storage.get_transaction(transaction_id).await? {
            Some(tx) if tx.organization_id == organization_id => Ok(tx),
            _ => Err(AccountingError::TransactionNotFound(transaction_id.to_string())),
        }
    }

    /// Cancels a pending transaction whose deadline has passed. Must be called with the
    /// transaction's lock held.
    async fn expire_if_overdue(&self, tx: Transaction) -> Result<Transaction, AccountingError> {
        let now = self.clock.now();
        if tx.state() != TransactionState::Pending || !tx.is_expired(now) {
            return Ok(tx);
        }

        let mut expired = tx.clone();
        expired.mark_cancelled(now)?;
        self.storage
            .apply(ChangeSet::new().update_transaction_state(expired.clone(), tx.version))
            .await?;
        expired.version = tx.version + 1;

        info!(transaction_id = %tx.id, deadline = %tx.deadline, "pending transaction expired");
        self.audit(
            tx.organization_id,
            TRANSACTION_EXPIRED,
            json!({
                "transaction_id": tx.id.to_string(),
                "deadline": tx.deadline.to_rfc3339(),
            }),
            None,
        )
        .await;
        Ok(expired)
    }

    /// Applies lazy expiry for read paths, taking the lock only when needed.
    async fn refresh(&self, tx: Transaction) -> Result<Transaction, AccountingError> {
        if tx.state() != TransactionState::Pending || !tx.is_expired(self.clock.now()) {
            return Ok(tx);
        }
        let _guard = self.locks.acquire(tx.id).await;
        let current = self.load_transaction(tx.organization_id, tx.id).await?;
        self.expire_if_overdue(current).await
    }

    async fn quorum_for(&self, organization: &Organization, tx: &Transaction) -> Result<QuorumStatus, AccountingError> {
        let participants = self.storage.list_active_participants(organization.id).await?;
        let confirmations = self.storage.list_confirmations(tx.id).await?;
        Ok(quorum::evaluate(organization.quorum, &participants, &confirmations))
    }

    fn validate_new_transaction(&self, input: &NewTransaction, now: DateTime<Utc>) -> Result<(), AccountingError> {
        let description = input.description.trim();
        if description.is_empty() {
            return Err(AccountingError::invalid_input(
                "description",
                "Invalid description",
                "description cannot be empty",
            ));
        }
        if description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(AccountingError::invalid_input(
                "description",
                "description Too Long",
                format!("description cannot exceed {} characters", MAX_DESCRIPTION_LENGTH),
            ));
        }
        if description.chars().any(char::is_control) {
            return Err(AccountingError::invalid_input(
                "description",
                "Invalid description",
                "description contains invalid characters",
            ));
        }
        if input.amount <= 0 {
            return Err(AccountingError::invalid_input(
                "amount",
                "Invalid Amount",
                "Amount must be greater than 0",
            ));
        }
        if input.max_fee_allowed < 0 {
            return Err(AccountingError::invalid_input(
                "max_fee_allowed",
                "Invalid Fee",
                "Maximum fee cannot be negative",
            ));
        }
        if input.destination.is_empty() {
            return Err(AccountingError::invalid_input(
                "destination",
                "Invalid Destination",
                "Destination address is required",
            ));
        }
        if input.deadline <= now {
            return Err(AccountingError::invalid_input(
                "deadline",
                "Invalid Deadline",
                "Deadline must be in the future",
            ));
        }
        Ok(())
    }

    #[instrument(skip(self, caller, input), fields(caller = %caller.user_id))]
    pub async fn create_transaction(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
        input: NewTransaction,
    ) -> Result<Transaction, AccountingError> {
        self.require_organization(organization_id).await?;
        self.require_active_participant(organization_id, caller.user_id)
            .await?;

        let now = self.clock.now();
        self.validate_new_transaction(&input, now)?;

        let tx = Transaction {
            id: Uuid::new_v4(),
            organization_id,
            created_by: caller.user_id,
            description: input.description.trim().to_string(),
            amount: input.amount,
            destination: input.destination,
            max_fee_allowed: input.max_fee_allowed,
            deadline: input.deadline,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            cancelled_at: None,
            committed_at: None,
            settlement_reference: None,
            version: 0,
        };
        self.storage.create_transaction(tx.clone()).await?;

        self.audit(
            organization_id,
            TRANSACTION_CREATED,
            json!({
                "transaction_id": tx.id.to_string(),
                "amount": tx.amount.to_string(),
                "max_fee_allowed": tx.max_fee_allowed.to_string(),
                "deadline": tx.deadline.to_rfc3339(),
            }),
            Some(caller.user_id),
        )
        .await;
        Ok(tx)
    }

    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    pub async fn record_confirmation(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
        transaction_id: Uuid,
        approve: bool,
    ) -> Result<ConfirmationOutcome, AccountingError> {
        let organization = self.require_organization(organization_id).await?;
        self.require_active_participant(organization_id, caller.user_id)
            .await?;

        let _guard = self.locks.acquire(transaction_id).await;
        let tx = self.load_transaction(organization_id, transaction_id).await?;
        let tx = self.expire_if_overdue(tx).await?;
        let state = tx.state();
        if state.is_terminal() {
            return Err(AccountingError::InvalidState(
                tx.id.to_string(),
                state.to_string(),
                "votes are only accepted while the transaction is undecided".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut confirmations = self.storage.list_confirmations(tx.id).await?;
        let vote = match confirmations.iter_mut().find(|c| c.user_id == caller.user_id) {
            Some(existing) => {
                existing.confirmed = approve;
                existing.updated_at = now;
                existing.clone()
            }
            None => {
                let vote = TransactionConfirmation {
                    transaction_id: tx.id,
                    organization_id,
                    user_id: caller.user_id,
                    confirmed: approve,
                    created_at: now,
                    updated_at: now,
                };
                confirmations.push(vote.clone());
                vote
            }
        };

        let participants = self.storage.list_active_participants(organization_id).await?;
        let status = quorum::evaluate(organization.quorum, &participants, &confirmations);

        let mut updated = tx.clone();
        updated.updated_at = now;
        let became_confirmed = state == TransactionState::Pending && status.is_reached();
        if became_confirmed {
            updated.mark_confirmed(now)?;
        }

        self.storage
            .apply(
                ChangeSet::new()
                    .upsert_confirmation(vote)
                    .update_transaction_state(updated.clone(), tx.version),
            )
            .await?;
        updated.version = tx.version + 1;

        debug!(
            transaction_id = %tx.id,
            approve,
            confirmed = status.confirmed,
            required = ?status.required,
            "vote recorded"
        );
        self.audit(
            organization_id,
            CONFIRMATION_RECORDED,
            json!({
                "transaction_id": tx.id.to_string(),
                "approve": approve.to_string(),
                "confirmed": status.confirmed.to_string(),
            }),
            Some(caller.user_id),
        )
        .await;
        if became_confirmed {
            info!(transaction_id = %tx.id, "transaction reached quorum");
            self.audit(
                organization_id,
                TRANSACTION_CONFIRMED,
                json!({ "transaction_id": tx.id.to_string() }),
                Some(caller.user_id),
            )
            .await;
        }

        Ok(ConfirmationOutcome {
            transaction: updated,
            quorum: status,
            became_confirmed,
        })
    }

    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    pub async fn cancel(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, AccountingError> {
        self.require_organization(organization_id).await?;
        let actor = self
            .require_active_participant(organization_id, caller.user_id)
            .await?;

        let _guard = self.locks.acquire(transaction_id).await;
        let tx = self.load_transaction(organization_id, transaction_id).await?;
        if tx.created_by != caller.user_id && !actor.is_admin() {
            return Err(AccountingError::Unauthorized(
                caller.user_id.to_string(),
                format!("cancel transaction {}", tx.id),
            ));
        }
        let tx = self.expire_if_overdue(tx).await?;

        let mut cancelled = tx.clone();
        cancelled.mark_cancelled(self.clock.now())?;
        self.storage
            .apply(ChangeSet::new().update_transaction_state(cancelled.clone(), tx.version))
            .await?;
        cancelled.version = tx.version + 1;

        self.audit(
            organization_id,
            TRANSACTION_CANCELLED,
            json!({
                "transaction_id": tx.id.to_string(),
                "previous_state": tx.state().to_string(),
            }),
            Some(caller.user_id),
        )
        .await;
        Ok(cancelled)
    }

    /// Sends a confirmed transaction to the settlement service and records the outcome.
    ///
    /// On any gateway failure the transaction stays Confirmed and the error is returned;
    /// only `SettlementUnavailable` is safe to retry as is. The deadline is enforced when
    /// the intent is sent, and `committed_at` records that moment.
    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    pub async fn commit(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, AccountingError> {
        let organization = self.require_organization(organization_id).await?;
        self.require_active_participant(organization_id, caller.user_id)
            .await?;

        let _guard = self.locks.acquire(transaction_id).await;
        let tx = self.load_transaction(organization_id, transaction_id).await?;
        let tx = self.expire_if_overdue(tx).await?;
        if tx.state() != TransactionState::Confirmed {
            return Err(AccountingError::InvalidState(
                tx.id.to_string(),
                tx.state().to_string(),
                "only confirmed transactions can be committed".to_string(),
            ));
        }
        let sent_at = self.clock.now();
        if tx.is_expired(sent_at) {
            return Err(AccountingError::InvalidState(
                tx.id.to_string(),
                tx.state().to_string(),
                "deadline has passed".to_string(),
            ));
        }
        let contract_address = organization.multisig_address.clone().ok_or_else(|| {
            AccountingError::InvalidOrganizationState(
                organization_id.to_string(),
                "multisig wallet is not deployed".to_string(),
            )
        })?;

        let request = CommitTransactionRequest {
            idempotency_key: tx.id,
            contract_address,
            destination: format!("0x{}", hex::encode(&tx.destination)),
            value: tx.amount,
            max_fee_allowed: tx.max_fee_allowed,
            deadline: tx.deadline.timestamp(),
        };

        let receipt = match self.gateway.commit_transaction(caller, request).await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(transaction_id = %tx.id, error = %err, retryable = err.is_retryable(), "commit failed");
                self.audit(
                    organization_id,
                    COMMIT_FAILED,
                    json!({
                        "transaction_id": tx.id.to_string(),
                        "error": err.to_string(),
                    }),
                    Some(caller.user_id),
                )
                .await;
                return Err(err);
            }
        };

        let mut committed = tx.clone();
        committed.mark_committed(sent_at, Some(receipt.tx_hash.clone()))?;
        if let Err(err) = self
            .storage
            .apply(ChangeSet::new().update_transaction_state(committed.clone(), tx.version))
            .await
        {
            // Already settled. A retry must reuse the same idempotency key.
            error!(transaction_id = %tx.id, tx_hash = %receipt.tx_hash, error = %err, "settled but not recorded");
            return Err(err);
        }
        committed.version = tx.version + 1;

        info!(transaction_id = %tx.id, tx_hash = %receipt.tx_hash, "transaction committed");
        self.audit(
            organization_id,
            TRANSACTION_COMMITTED,
            json!({
                "transaction_id": tx.id.to_string(),
                "tx_hash": receipt.tx_hash,
            }),
            Some(caller.user_id),
        )
        .await;
        Ok(committed)
    }

    pub async fn get_transaction(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, AccountingError> {
        self.require_organization(organization_id).await?;
        self.require_active_participant(organization_id, caller.user_id)
            .await?;
        let tx = self.load_transaction(organization_id, transaction_id).await?;
        self.refresh(tx).await
    }

    pub async fn list_transactions(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
    ) -> Result<Vec<Transaction>, AccountingError> {
        self.require_organization(organization_id).await?;
        self.require_active_participant(organization_id, caller.user_id)
            .await?;

        let mut transactions = Vec::new();
        for tx in self.storage.list_transactions(organization_id).await? {
            transactions.push(self.refresh(tx).await?);
        }
        Ok(transactions)
    }

    pub async fn list_confirmations(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<(Vec<TransactionConfirmation>, QuorumStatus), AccountingError> {
        let organization = self.require_organization(organization_id).await?;
        self.require_active_participant(organization_id, caller.user_id)
            .await?;
        let tx = self.load_transaction(organization_id, transaction_id).await?;
        let tx = self.refresh(tx).await?;

        let confirmations = self.storage.list_confirmations(tx.id).await?;
        let status = self.quorum_for(&organization, &tx).await?;
        Ok((confirmations, status))
    }

    pub async fn quorum_status(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<QuorumStatus, AccountingError> {
        let (_, status) = self
            .list_confirmations(caller, organization_id, transaction_id)
            .await?;
        Ok(status)
    }

    /// Re-checks the quorum of every pending transaction of an organization after its
    /// membership or quorum policy changed. Returns how many became Confirmed.
    #[instrument(skip(self))]
    pub async fn reevaluate_pending(&self, organization_id: Uuid) -> Result<usize, AccountingError> {
        let organization = self.require_organization(organization_id).await?;
        let mut confirmed = 0;
        for tx in self.storage.list_transactions(organization_id).await? {
            if tx.state() != TransactionState::Pending {
                continue;
            }
            let _guard = self.locks.acquire(tx.id).await;
            let tx = self.load_transaction(organization_id, tx.id).await?;
            let tx = self.expire_if_overdue(tx).await?;
            if tx.state() != TransactionState::Pending {
                continue;
            }
            let status = self.quorum_for(&organization, &tx).await?;
            if !status.is_reached() {
                continue;
            }

            let now = self.clock.now();
            let mut updated = tx.clone();
            updated.updated_at = now;
            updated.mark_confirmed(now)?;
            self.storage
                .apply(ChangeSet::new().update_transaction_state(updated, tx.version))
                .await?;
            confirmed += 1;

            info!(transaction_id = %tx.id, "transaction reached quorum after membership change");
            self.audit(
                organization_id,
                TRANSACTION_CONFIRMED,
                json!({ "transaction_id": tx.id.to_string() }),
                None,
            )
            .await;
        }
        Ok(confirmed)
    }

    /// Cancels every pending transaction whose deadline has passed, as any access would.
    pub async fn sweep_expired(&self) -> Result<usize, AccountingError> {
        let now = self.clock.now();
        let mut expired = 0;
        for tx in self.storage.list_pending_transactions().await? {
            if !tx.is_expired(now) {
                continue;
            }
            let refreshed = self.refresh(tx).await?;
            if refreshed.state() == TransactionState::Cancelled {
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, "expired pending transactions");
        }
        Ok(expired)
    }
}
