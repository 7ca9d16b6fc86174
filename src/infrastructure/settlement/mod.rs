//! Boundary to the external settlement service.
//!
//! Gateways are stateless with respect to domain data: they never read or write the
//! store. Callers own every state transition that depends on a gateway result.

pub mod http;
pub mod types;

use crate::auth::identity::CallerIdentity;
use crate::core::errors::AccountingError;
use crate::core::models::organization::OrganizationParticipant;
use async_trait::async_trait;
use types::{
    CommitReceipt, CommitTransactionRequest, DeployMultisigRequest, DeploySalariesRequest, DeployedContract,
};

#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Deploys the organization's multisig wallet. Authenticated with the caller's seed.
    async fn deploy_multisig_wallet(
        &self,
        caller: &CallerIdentity,
        request: DeployMultisigRequest,
    ) -> Result<DeployedContract, AccountingError>;

    /// Maps seed material to an opaque public key.
    async fn derive_public_key(&self, seed_phrase: &str) -> Result<Vec<u8>, AccountingError>;

    /// Sends a salary deployment without any authorization check. Only
    /// [`SettlementGateway::deploy_salary_schedule`] calls this, after verifying the caller.
    async fn submit_salary_deployment_unchecked(
        &self,
        caller: &CallerIdentity,
        request: DeploySalariesRequest,
    ) -> Result<DeployedContract, AccountingError>;

    /// Sends the settlement intent of a confirmed transaction.
    async fn commit_transaction(
        &self,
        caller: &CallerIdentity,
        request: CommitTransactionRequest,
    ) -> Result<CommitReceipt, AccountingError>;

    /// Deploys the salary schedule on behalf of the organization's first admin.
    ///
    /// The caller must be that first admin. This is checked locally before anything
    /// is sent.
    async fn deploy_salary_schedule(
        &self,
        caller: &CallerIdentity,
        first_admin: &OrganizationParticipant,
    ) -> Result<DeployedContract, AccountingError> {
        authorize_salary_deployment(caller, first_admin)?;
        let request = DeploySalariesRequest {
            authorized_wallet: format!("0x{}", caller.seed.to_hex()),
        };
        self.submit_salary_deployment_unchecked(caller, request).await
    }
}

pub fn authorize_salary_deployment(
    caller: &CallerIdentity,
    first_admin: &OrganizationParticipant,
) -> Result<(), AccountingError> {
    if caller.user_id != first_admin.user_id || !first_admin.is_first_admin() || first_admin.has_left() {
        return Err(AccountingError::Unauthorized(
            caller.user_id.to_string(),
            "deploy the salary schedule".to_string(),
        ));
    }
    Ok(())
}
