use crate::auth::identity::CallerIdentity;
use crate::core::constants::{
    MAX_NAME_LENGTH, MULTISIG_DEPLOYED, ORGANIZATION_CREATED, PARTICIPANT_ADDED, PARTICIPANT_REMOVED,
    PUBLIC_KEY_TTL_SECS, QUORUM_UPDATED, SALARIES_DEPLOYED, USER_LOGGED_IN, USER_REGISTERED,
};
use crate::core::errors::AccountingError;
use crate::core::locks::KeyedLocks;
use crate::core::models::{
    audit::{AppLog, OrganizationAudit},
    organization::{Organization, OrganizationParticipant, QuorumPolicy, Role},
    user::{Seed, User},
};
use crate::core::quorum;
use crate::core::time::TimeSource;
use crate::infrastructure::cache::Cache;
use crate::infrastructure::logging::LoggingService;
use crate::infrastructure::settlement::SettlementGateway;
use crate::infrastructure::settlement::types::{DeployMultisigRequest, DeployedContract};
use crate::infrastructure::storage::Storage;
use futures::future::try_join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Users, organizations, membership and the organization-level chain deployments.
pub struct OrganizationService<S: Storage, G: SettlementGateway, L: LoggingService, C: Cache> {
    storage: Arc<S>,
    gateway: Arc<G>,
    logging: Arc<L>,
    cache: Arc<C>,
    clock: Arc<dyn TimeSource>,
    deployments: KeyedLocks,
}

impl<S: Storage, G: SettlementGateway, L: LoggingService, C: Cache> OrganizationService<S, G, L, C> {
    pub fn new(storage: Arc<S>, gateway: Arc<G>, logging: Arc<L>, cache: Arc<C>, clock: Arc<dyn TimeSource>) -> Self {
        OrganizationService {
            storage,
            gateway,
            logging,
            cache,
            clock,
            deployments: KeyedLocks::new(),
        }
    }

    async fn log_and_audit(
        &self,
        organization_id: Option<Uuid>,
        action: &str,
        log_details: serde_json::Value,
        user_id: Option<Uuid>,
    ) -> Result<(), AccountingError> {
        let user_id = user_id.map(|id| id.to_string());
        self.logging
            .log_action(action, log_details.clone(), user_id.as_deref())
            .await?;
        if let Some(oid) = organization_id {
            self.storage
                .save_organization_audit(OrganizationAudit {
                    id: Uuid::new_v4().to_string(),
                    organization_id: oid.to_string(),
                    action: action.to_string(),
                    user_id,
                    details: serde_json::from_value(log_details).unwrap_or_default(),
                    timestamp: self.clock.now(),
                })
                .await?;
        }
        Ok(())
    }

    fn validate_string_input(&self, field: &str, value: &str, max_length: usize) -> Result<(), AccountingError> {
        if value.trim().is_empty() {
            return Err(AccountingError::invalid_input(
                field,
                format!("Invalid {}", field),
                format!("{} cannot be empty", field),
            ));
        }
        if value.chars().count() > max_length {
            return Err(AccountingError::invalid_input(
                field,
                format!("{} Too Long", field),
                format!("{} cannot exceed {} characters", field, max_length),
            ));
        }
        if value.chars().any(|c| c.is_control() || "<>{}[]".contains(c)) {
            return Err(AccountingError::invalid_input(
                field,
                format!("Invalid {}", field),
                format!("{} contains invalid characters", field),
            ));
        }
        Ok(())
    }

    fn validate_quorum(&self, quorum: QuorumPolicy) -> Result<(), AccountingError> {
        if quorum == QuorumPolicy::Threshold(0) {
            return Err(AccountingError::invalid_input(
                "quorum",
                "Invalid Quorum",
                "A threshold quorum needs at least one confirmation",
            ));
        }
        Ok(())
    }

    fn parse_seed(&self, seed_hex: &str) -> Result<Seed, AccountingError> {
        let seed = Seed::from_hex(seed_hex.trim())
            .map_err(|_| AccountingError::invalid_input("seed", "Invalid seed", "seed must be hex encoded"))?;
        if seed.is_empty() {
            return Err(AccountingError::invalid_input("seed", "Invalid seed", "seed cannot be empty"));
        }
        Ok(seed)
    }

    /// Records an action whose outcome is already final. A failed audit write is logged
    /// and never replaces that outcome.
    async fn audit(
        &self,
        organization_id: Option<Uuid>,
        action: &str,
        details: serde_json::Value,
        user_id: Option<Uuid>,
    ) {
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

    async fn require_member(
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

    async fn require_admin(
        &self,
        organization_id: Uuid,
        caller: &CallerIdentity,
        action: &str,
    ) -> Result<OrganizationParticipant, AccountingError> {
        let participant = self.require_member(organization_id, caller.user_id).await?;
        if !participant.is_admin() {
            return Err(AccountingError::Unauthorized(caller.user_id.to_string(), action.to_string()));
        }
        Ok(participant)
    }

    async fn require_first_admin(
        &self,
        organization_id: Uuid,
        caller: &CallerIdentity,
        action: &str,
    ) -> Result<OrganizationParticipant, AccountingError> {
        let participant = self.require_member(organization_id, caller.user_id).await?;
        if !participant.is_first_admin() {
            return Err(AccountingError::Unauthorized(caller.user_id.to_string(), action.to_string()));
        }
        Ok(participant)
    }

    /// Registers an activated user for the given seed.
    pub async fn register_user(&self, seed_hex: &str, mnemonic: Option<String>) -> Result<User, AccountingError> {
        let seed = self.parse_seed(seed_hex)?;
        let mnemonic = mnemonic.map(|m| m.trim().to_string()).filter(|m| !m.is_empty());

        let now = self.clock.now();
        let user = self
            .storage
            .create_user(User {
                id: Uuid::new_v4(),
                seed,
                mnemonic,
                activated_at: Some(now),
                created_at: now,
            })
            .await?;

        self.audit(
            None,
            USER_REGISTERED,
            json!({ "user_id": user.id.to_string() }),
            Some(user.id),
        )
        .await;
        Ok(user)
    }

    /// Resolves the user owning `seed_hex`. Token issuance is left to the caller.
    pub async fn authenticate(&self, seed_hex: &str) -> Result<User, AccountingError> {
        let seed = Seed::from_hex(seed_hex.trim())
            .map_err(|_| AccountingError::Unauthenticated("invalid credentials".to_string()))?;
        let user = self
            .storage
            .get_user_by_seed(&seed)
            .await?
            .filter(User::is_active)
            .ok_or_else(|| AccountingError::Unauthenticated("invalid credentials".to_string()))?;

        self.audit(
            None,
            USER_LOGGED_IN,
            json!({ "user_id": user.id.to_string() }),
            Some(user.id),
        )
        .await;
        Ok(user)
    }

    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    pub async fn create_organization(
        &self,
        caller: &CallerIdentity,
        name: String,
        quorum: QuorumPolicy,
    ) -> Result<Organization, AccountingError> {
        self.validate_string_input("name", &name, MAX_NAME_LENGTH)?;
        self.validate_quorum(quorum)?;

        let now = self.clock.now();
        let organization = Organization {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            quorum,
            multisig_address: None,
            created_at: now,
            updated_at: now,
        };
        let first_admin = OrganizationParticipant {
            organization_id: organization.id,
            user_id: caller.user_id,
            role: Role::FirstAdmin,
            joined_at: now,
            left_at: None,
        };
        self.storage
            .create_organization(organization.clone(), first_admin)
            .await?;

        info!(organization_id = %organization.id, "organization created");
        self.audit(
            Some(organization.id),
            ORGANIZATION_CREATED,
            json!({
                "organization_id": organization.id.to_string(),
                "name": organization.name,
            }),
            Some(caller.user_id),
        )
        .await;
        Ok(organization)
    }

    pub async fn get_organization(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
    ) -> Result<Organization, AccountingError> {
        let organization = self.require_organization(organization_id).await?;
        self.require_member(organization_id, caller.user_id).await?;
        Ok(organization)
    }

    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    pub async fn add_participant(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationParticipant, AccountingError> {
        self.require_organization(organization_id).await?;
        self.require_admin(organization_id, caller, "add participants").await?;
        if role == Role::FirstAdmin {
            return Err(AccountingError::invalid_input(
                "role",
                "Invalid Role",
                "An organization has exactly one first admin",
            ));
        }

        let user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| AccountingError::UserNotFound(user_id.to_string()))?;
        if let Some(existing) = self.storage.get_participant(organization_id, user.id).await? {
            if !existing.has_left() {
                return Err(AccountingError::Conflict(format!(
                    "user {} is already a participant of organization {}",
                    user.id, organization_id
                )));
            }
        }

        let participant = OrganizationParticipant {
            organization_id,
            user_id: user.id,
            role,
            joined_at: self.clock.now(),
            left_at: None,
        };
        self.storage.save_participant(participant.clone()).await?;

        self.audit(
            Some(organization_id),
            PARTICIPANT_ADDED,
            json!({
                "participant_id": user.id.to_string(),
                "role": role.to_string(),
            }),
            Some(caller.user_id),
        )
        .await;
        Ok(participant)
    }

    /// Marks a participant as departed. Their votes stop counting towards any quorum.
    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    pub async fn remove_participant(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrganizationParticipant, AccountingError> {
        self.require_organization(organization_id).await?;
        self.require_admin(organization_id, caller, "remove participants").await?;

        let mut participant = match self.storage.get_participant(organization_id, user_id).await? {
            Some(participant) if !participant.has_left() => participant,
            _ => {
                return Err(AccountingError::ParticipantNotFound(
                    user_id.to_string(),
                    organization_id.to_string(),
                ));
            }
        };
        if participant.is_first_admin() {
            return Err(AccountingError::Unauthorized(
                caller.user_id.to_string(),
                "remove the first admin".to_string(),
            ));
        }

        participant.left_at = Some(self.clock.now());
        self.storage.save_participant(participant.clone()).await?;

        self.audit(
            Some(organization_id),
            PARTICIPANT_REMOVED,
            json!({ "participant_id": user_id.to_string() }),
            Some(caller.user_id),
        )
        .await;
        Ok(participant)
    }

    pub async fn update_quorum(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
        quorum: QuorumPolicy,
    ) -> Result<Organization, AccountingError> {
        let mut organization = self.require_organization(organization_id).await?;
        self.require_first_admin(organization_id, caller, "change the quorum")
            .await?;
        self.validate_quorum(quorum)?;

        organization.quorum = quorum;
        organization.updated_at = self.clock.now();
        self.storage.save_organization(organization.clone()).await?;

        self.audit(
            Some(organization_id),
            QUORUM_UPDATED,
            json!({ "quorum": format!("{:?}", quorum) }),
            Some(caller.user_id),
        )
        .await;
        Ok(organization)
    }

    pub async fn list_participants(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationParticipant>, AccountingError> {
        self.require_organization(organization_id).await?;
        self.require_member(organization_id, caller.user_id).await?;
        self.storage.list_active_participants(organization_id).await
    }

    async fn public_key_of(&self, user: &User) -> Result<Vec<u8>, AccountingError> {
        let cache_key = user.id.to_string();
        if let Some(public_key) = self.cache.get_public_key(&cache_key).await? {
            return Ok(public_key);
        }
        let public_key = self.gateway.derive_public_key(&user.seed_phrase()).await?;
        self.cache
            .save_public_key(&cache_key, &public_key, Duration::from_secs(PUBLIC_KEY_TTL_SECS))
            .await?;
        Ok(public_key)
    }

    /// Deploys the organization's multisig wallet with every active participant as an owner.
    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    pub async fn deploy_multisig(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
    ) -> Result<Organization, AccountingError> {
        self.require_organization(organization_id).await?;
        self.require_first_admin(organization_id, caller, "deploy the multisig wallet")
            .await?;

        let _guard = self.deployments.acquire(organization_id).await;
        let mut organization = self.require_organization(organization_id).await?;
        if let Some(address) = &organization.multisig_address {
            return Err(AccountingError::InvalidOrganizationState(
                organization_id.to_string(),
                format!("multisig wallet already deployed at {}", address),
            ));
        }

        let participants = self.storage.list_active_participants(organization_id).await?;
        let mut owners = Vec::with_capacity(participants.len());
        for participant in &participants {
            let user = self
                .storage
                .get_user(participant.user_id)
                .await?
                .ok_or_else(|| AccountingError::UserNotFound(participant.user_id.to_string()))?;
            owners.push(user);
        }
        let public_keys = try_join_all(owners.iter().map(|user| self.public_key_of(user))).await?;

        let owner_count = public_keys.len() as u32;
        let confirmations = quorum::required_confirmations(organization.quorum, owner_count)
            .map(|required| required.min(owner_count))
            .ok_or_else(|| {
                AccountingError::InvalidOrganizationState(
                    organization_id.to_string(),
                    "no active participants to own the wallet".to_string(),
                )
            })?;

        let request = DeployMultisigRequest {
            owners: public_keys
                .iter()
                .map(|key| format!("0x{}", hex::encode(key)))
                .collect(),
            confirmations,
        };
        debug!(owners = owner_count, confirmations, "deploying multisig wallet");
        let deployed = self.gateway.deploy_multisig_wallet(caller, request).await?;

        organization.multisig_address = Some(deployed.address.clone());
        organization.updated_at = self.clock.now();
        self.storage.save_organization(organization.clone()).await?;

        info!(organization_id = %organization_id, address = %deployed.address, "multisig wallet deployed");
        self.audit(
            Some(organization_id),
            MULTISIG_DEPLOYED,
            json!({
                "address": deployed.address,
                "owners": owner_count.to_string(),
                "confirmations": confirmations.to_string(),
            }),
            Some(caller.user_id),
        )
        .await;
        Ok(organization)
    }

    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    pub async fn deploy_salaries(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
    ) -> Result<DeployedContract, AccountingError> {
        self.require_organization(organization_id).await?;
        self.require_member(organization_id, caller.user_id).await?;

        let first_admin = self
            .storage
            .list_active_participants(organization_id)
            .await?
            .into_iter()
            .find(OrganizationParticipant::is_first_admin)
            .ok_or_else(|| {
                AccountingError::InvalidOrganizationState(
                    organization_id.to_string(),
                    "organization has no active first admin".to_string(),
                )
            })?;

        let deployed = self.gateway.deploy_salary_schedule(caller, &first_admin).await?;

        self.audit(
            Some(organization_id),
            SALARIES_DEPLOYED,
            json!({ "address": deployed.address }),
            Some(caller.user_id),
        )
        .await;
        Ok(deployed)
    }

    pub async fn get_organization_audits(
        &self,
        caller: &CallerIdentity,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationAudit>, AccountingError> {
        self.require_organization(organization_id).await?;
        self.require_member(organization_id, caller.user_id).await?;
        self.storage
            .get_organization_audits(&organization_id.to_string())
            .await
    }

    /// Application log entries of actions taken by `caller`.
    pub async fn get_app_logs(&self, caller: &CallerIdentity) -> Result<Vec<AppLog>, AccountingError> {
        let user_id = caller.user_id.to_string();
        let logs = self.logging.get_logs().await?;
        Ok(logs
            .into_iter()
            .filter(|log| log.user_id.as_deref() == Some(user_id.as_str()))
            .collect())
    }
}
