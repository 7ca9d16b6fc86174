use crate::core::errors::AccountingError;
use crate::core::models::{
    audit::OrganizationAudit,
    organization::{Organization, OrganizationParticipant},
    transaction::{Transaction, TransactionConfirmation},
    user::{Seed, User},
};
use async_trait::async_trait;
use uuid::Uuid;

/// A single row-level write inside a [`ChangeSet`].
#[derive(Clone, Debug)]
pub enum Mutation {
    /// Insert or replace the vote of `user_id` on `transaction_id`.
    UpsertConfirmation(TransactionConfirmation),
    /// Replace the stored transaction if its version still equals `expected_version`.
    /// The store bumps the version on success.
    UpdateTransactionState {
        transaction: Transaction,
        expected_version: u64,
    },
}

/// Writes that must become visible together or not at all.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    pub mutations: Vec<Mutation>,
}

impl ChangeSet {
    pub fn new() -> Self {
        ChangeSet::default()
    }

    pub fn upsert_confirmation(mut self, confirmation: TransactionConfirmation) -> Self {
        self.mutations.push(Mutation::UpsertConfirmation(confirmation));
        self
    }

    pub fn update_transaction_state(mut self, transaction: Transaction, expected_version: u64) -> Self {
        self.mutations.push(Mutation::UpdateTransactionState {
            transaction,
            expected_version,
        });
        self
    }
}

/// Persistence collaborator. Implementations store rows; they never decide state transitions.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_user(&self, user: User) -> Result<User, AccountingError>;
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AccountingError>;
    async fn get_user_by_seed(&self, seed: &Seed) -> Result<Option<User>, AccountingError>;

    async fn create_organization(
        &self,
        organization: Organization,
        first_admin: OrganizationParticipant,
    ) -> Result<(), AccountingError>;
    async fn get_organization(&self, organization_id: Uuid) -> Result<Option<Organization>, AccountingError>;
    async fn save_organization(&self, organization: Organization) -> Result<(), AccountingError>;

    async fn save_participant(&self, participant: OrganizationParticipant) -> Result<(), AccountingError>;
    async fn get_participant(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrganizationParticipant>, AccountingError>;
    /// Participants that have not left and whose user account is activated.
    async fn list_active_participants(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationParticipant>, AccountingError>;

    async fn create_transaction(&self, transaction: Transaction) -> Result<(), AccountingError>;
    async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<Transaction>, AccountingError>;
    async fn list_transactions(&self, organization_id: Uuid) -> Result<Vec<Transaction>, AccountingError>;
    async fn list_pending_transactions(&self) -> Result<Vec<Transaction>, AccountingError>;
    async fn list_confirmations(&self, transaction_id: Uuid) -> Result<Vec<TransactionConfirmation>, AccountingError>;

    /// Applies every mutation atomically. A stale `expected_version` yields `Conflict`
    /// and leaves the store untouched.
    async fn apply(&self, changes: ChangeSet) -> Result<(), AccountingError>;

    async fn save_organization_audit(&self, audit: OrganizationAudit) -> Result<(), AccountingError>;
    async fn get_organization_audits(&self, organization_id: &str) -> Result<Vec<OrganizationAudit>, AccountingError>;
}

pub mod in_memory;
