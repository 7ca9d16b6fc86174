use crate::core::errors::AccountingError;
use crate::core::models::{
    audit::OrganizationAudit,
    organization::{Organization, OrganizationParticipant},
    transaction::{Transaction, TransactionConfirmation, TransactionState},
    user::{Seed, User},
};
use crate::infrastructure::storage::{ChangeSet, Mutation, Storage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

type ConfirmationRows = HashMap<Uuid, HashMap<Uuid, TransactionConfirmation>>;

#[derive(Clone, Default)]
pub struct InMemoryStorage {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    users_by_seed: Arc<RwLock<HashMap<String, Uuid>>>,
    organizations: Arc<RwLock<HashMap<Uuid, Organization>>>,
    participants: Arc<RwLock<HashMap<(Uuid, Uuid), OrganizationParticipant>>>,
    transactions: Arc<RwLock<HashMap<Uuid, Transaction>>>,
    confirmations: Arc<RwLock<ConfirmationRows>>,
    organization_audits: Arc<RwLock<HashMap<String, Vec<OrganizationAudit>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage::default()
    }
}

fn check_mutation(
    mutation: &Mutation,
    transactions: &HashMap<Uuid, Transaction>,
) -> Result<(), AccountingError> {
    match mutation {
        Mutation::UpsertConfirmation(confirmation) => {
            let tx = transactions
                .get(&confirmation.transaction_id)
                .ok_or_else(|| AccountingError::TransactionNotFound(confirmation.transaction_id.to_string()))?;
            if tx.organization_id != confirmation.organization_id {
                return Err(AccountingError::StorageError(format!(
                    "confirmation for transaction {} is scoped to a different organization",
                    tx.id
                )));
            }
            Ok(())
        }
        Mutation::UpdateTransactionState {
            transaction,
            expected_version,
        } => {
            let stored = transactions
                .get(&transaction.id)
                .ok_or_else(|| AccountingError::TransactionNotFound(transaction.id.to_string()))?;
            if stored.version != *expected_version {
                return Err(AccountingError::Conflict(format!(
                    "transaction {} was modified concurrently (expected version {}, found {})",
                    transaction.id, expected_version, stored.version
                )));
            }
            transaction.check_invariants()
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_user(&self, user: User) -> Result<User, AccountingError> {
        let mut users_by_seed = self.users_by_seed.write().await;
        let seed_key = user.seed.to_hex();
        if users_by_seed.contains_key(&seed_key) {
            return Err(AccountingError::Conflict("a user with this seed already exists".to_string()));
        }
        users_by_seed.insert(seed_key, user.id);
        self.users.write().await.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AccountingError> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn get_user_by_seed(&self, seed: &Seed) -> Result<Option<User>, AccountingError> {
        let user_id = self.users_by_seed.read().await.get(&seed.to_hex()).copied();
        Ok(match user_id {
            Some(id) => self.users.read().await.get(&id).cloned(),
            None => None,
        })
    }

    async fn create_organization(
        &self,
        organization: Organization,
        first_admin: OrganizationParticipant,
    ) -> Result<(), AccountingError> {
        let mut organizations = self.organizations.write().await;
        let mut participants = self.participants.write().await;
        if organizations.contains_key(&organization.id) {
            return Err(AccountingError::Conflict(format!(
                "organization {} already exists",
                organization.id
            )));
        }
        participants.insert((first_admin.organization_id, first_admin.user_id), first_admin);
        organizations.insert(organization.id, organization);
        Ok(())
    }

    async fn get_organization(&self, organization_id: Uuid) -> Result<Option<Organization>, AccountingError> {
        Ok(self.organizations.read().await.get(&organization_id).cloned())
    }

    async fn save_organization(&self, organization: Organization) -> Result<(), AccountingError> {
        let mut organizations = self.organizations.write().await;
        if !organizations.contains_key(&organization.id) {
            return Err(AccountingError::OrganizationNotFound(organization.id.to_string()));
        }
        organizations.insert(organization.id, organization);
        Ok(())
    }

    async fn save_participant(&self, participant: OrganizationParticipant) -> Result<(), AccountingError> {
        if !self
            .organizations
            .read()
            .await
            .contains_key(&participant.organization_id)
        {
            return Err(AccountingError::OrganizationNotFound(
                participant.organization_id.to_string(),
            ));
        }
        self.participants
            .write()
            .await
            .insert((participant.organization_id, participant.user_id), participant);
        Ok(())
    }

    async fn get_participant(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrganizationParticipant>, AccountingError> {
        Ok(self
            .participants
            .read()
            .await
            .get(&(organization_id, user_id))
            .cloned())
    }

    async fn list_active_participants(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationParticipant>, AccountingError> {
        let participants = self.participants.read().await;
        let users = self.users.read().await;
        let mut active: Vec<OrganizationParticipant> = participants
            .values()
            .filter(|p| p.organization_id == organization_id && !p.has_left())
            .filter(|p| users.get(&p.user_id).is_some_and(User::is_active))
            .cloned()
            .collect();
        active.sort_by_key(|p| p.joined_at);
        Ok(active)
    }

    async fn create_transaction(&self, transaction: Transaction) -> Result<(), AccountingError> {
        transaction.check_invariants()?;
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&transaction.id) {
            return Err(AccountingError::Conflict(format!(
                "transaction {} already exists",
                transaction.id
            )));
        }
        transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<Transaction>, AccountingError> {
        Ok(self.transactions.read().await.get(&transaction_id).cloned())
    }

    async fn list_transactions(&self, organization_id: Uuid) -> Result<Vec<Transaction>, AccountingError> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|tx| tx.organization_id == organization_id)
            .cloned()
            .collect();
        transactions.sort_by_key(|tx| tx.created_at);
        Ok(transactions)
    }

    async fn list_pending_transactions(&self) -> Result<Vec<Transaction>, AccountingError> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .filter(|tx| tx.state() == TransactionState::Pending)
            .cloned()
            .collect())
    }

    async fn list_confirmations(&self, transaction_id: Uuid) -> Result<Vec<TransactionConfirmation>, AccountingError> {
        let mut rows: Vec<TransactionConfirmation> = self
            .confirmations
            .read()
            .await
            .get(&transaction_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by_key(|c| c.created_at);
        Ok(rows)
    }

    async fn apply(&self, changes: ChangeSet) -> Result<(), AccountingError> {
        // Lock order: transactions, then confirmations.
        let mut transactions = self.transactions.write().await;
        let mut confirmations = self.confirmations.write().await;

        for mutation in &changes.mutations {
            check_mutation(mutation, &transactions)?;
        }

        for mutation in changes.mutations {
            match mutation {
                Mutation::UpsertConfirmation(confirmation) => {
                    let rows = confirmations.entry(confirmation.transaction_id).or_default();
                    match rows.get_mut(&confirmation.user_id) {
                        Some(existing) => {
                            existing.confirmed = confirmation.confirmed;
                            existing.updated_at = confirmation.updated_at;
                        }
                        None => {
                            rows.insert(confirmation.user_id, confirmation);
                        }
                    }
                }
                Mutation::UpdateTransactionState {
                    mut transaction,
                    expected_version,
                } => {
                    transaction.version = expected_version + 1;
                    transactions.insert(transaction.id, transaction);
                }
            }
        }
        Ok(())
    }

    async fn save_organization_audit(&self, audit: OrganizationAudit) -> Result<(), AccountingError> {
        let mut audits = self.organization_audits.write().await;
        audits.entry(audit.organization_id.clone()).or_default().push(audit);
        Ok(())
    }

    async fn get_organization_audits(&self, organization_id: &str) -> Result<Vec<OrganizationAudit>, AccountingError> {
        Ok(self
            .organization_audits
            .read()
            .await
            .get(organization_id)
            .cloned()
            .unwrap_or_default())
    }
}
