mod confirmation_tests;
mod organization_tests;

use crate::auth::identity::CallerIdentity;
use crate::core::engine::{AuthorizationEngine, NewTransaction};
use crate::core::errors::AccountingError;
use crate::core::models::organization::{Organization, QuorumPolicy, Role};
use crate::core::models::user::Seed;
use crate::core::services::OrganizationService;
use crate::core::time::{ManualTimeSource, TimeSource};
use crate::infrastructure::cache::in_memory::InMemoryCache;
use crate::infrastructure::logging::in_memory::InMemoryLogging;
use crate::infrastructure::settlement::SettlementGateway;
use crate::infrastructure::settlement::types::{
    CommitReceipt, CommitTransactionRequest, DeployMultisigRequest, DeploySalariesRequest, DeployedContract,
};
use crate::infrastructure::storage::in_memory::InMemoryStorage;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use uuid::Uuid;

/// Settlement gateway double. Commit outcomes are scripted; everything else succeeds.
#[derive(Default)]
pub struct FakeGateway {
    commit_outcomes: Mutex<VecDeque<Result<CommitReceipt, AccountingError>>>,
    pub commits: Mutex<Vec<CommitTransactionRequest>>,
    pub deployments: Mutex<Vec<DeployMultisigRequest>>,
    pub derivations: Mutex<Vec<String>>,
    pub salary_deployments: Mutex<Vec<DeploySalariesRequest>>,
}

impl FakeGateway {
    pub fn script_commit(&self, outcome: Result<CommitReceipt, AccountingError>) {
        self.commit_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }
}

#[async_trait]
impl SettlementGateway for FakeGateway {
    async fn deploy_multisig_wallet(
        &self,
        _caller: &CallerIdentity,
        request: DeployMultisigRequest,
    ) -> Result<DeployedContract, AccountingError> {
        self.deployments.lock().unwrap().push(request);
        Ok(DeployedContract {
            address: "0xmultisig".to_string(),
        })
    }

    async fn derive_public_key(&self, seed_phrase: &str) -> Result<Vec<u8>, AccountingError> {
        self.derivations.lock().unwrap().push(seed_phrase.to_string());
        Ok(seed_phrase.as_bytes().iter().rev().copied().collect())
    }

    async fn submit_salary_deployment_unchecked(
        &self,
        _caller: &CallerIdentity,
        request: DeploySalariesRequest,
    ) -> Result<DeployedContract, AccountingError> {
        self.salary_deployments.lock().unwrap().push(request);
        Ok(DeployedContract {
            address: "0xsalaries".to_string(),
        })
    }

    async fn commit_transaction(
        &self,
        _caller: &CallerIdentity,
        request: CommitTransactionRequest,
    ) -> Result<CommitReceipt, AccountingError> {
        let tx_hash = format!("0xhash-{}", request.idempotency_key);
        self.commits.lock().unwrap().push(request);
        self.commit_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(CommitReceipt { tx_hash }))
    }
}

pub type TestEngine = AuthorizationEngine<InMemoryStorage, FakeGateway, InMemoryLogging>;
pub type TestOrganizations = OrganizationService<InMemoryStorage, FakeGateway, InMemoryLogging, InMemoryCache>;

pub struct TestContext {
    pub storage: Arc<InMemoryStorage>,
    pub gateway: Arc<FakeGateway>,
    pub logging: Arc<InMemoryLogging>,
    pub clock: ManualTimeSource,
    pub engine: Arc<TestEngine>,
    pub organizations: Arc<TestOrganizations>,
}

pub fn create_test_context() -> TestContext {
    let storage = Arc::new(InMemoryStorage::new());
    let gateway = Arc::new(FakeGateway::default());
    let logging = Arc::new(InMemoryLogging::new());
    let cache = Arc::new(InMemoryCache::new());
    let clock = ManualTimeSource::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());

    let engine = Arc::new(AuthorizationEngine::new(
        storage.clone(),
        gateway.clone(),
        logging.clone(),
        Arc::new(clock.clone()),
    ));
    let organizations = Arc::new(OrganizationService::new(
        storage.clone(),
        gateway.clone(),
        logging.clone(),
        cache,
        Arc::new(clock.clone()),
    ));

    TestContext {
        storage,
        gateway,
        logging,
        clock,
        engine,
        organizations,
    }
}

impl TestContext {
    pub async fn register(&self) -> CallerIdentity {
        let seed = Seed::new(Uuid::new_v4().as_bytes().to_vec());
        let user = self
            .organizations
            .register_user(&seed.to_hex(), None)
            .await
            .unwrap();
        CallerIdentity {
            user_id: user.id,
            seed: user.seed,
        }
    }

    /// Creates an organization whose first member is the first admin and the rest employees.
    pub async fn organization_with(&self, members: usize, quorum: QuorumPolicy) -> (Organization, Vec<CallerIdentity>) {
        let mut callers = Vec::with_capacity(members);
        for _ in 0..members {
            callers.push(self.register().await);
        }
        let organization = self
            .organizations
            .create_organization(&callers[0], "Acme".to_string(), quorum)
            .await
            .unwrap();
        for caller in &callers[1..] {
            self.organizations
                .add_participant(&callers[0], organization.id, caller.user_id, Role::Employee)
                .await
                .unwrap();
        }
        (organization, callers)
    }

    pub async fn deploy_wallet(&self, organization: &Organization, first_admin: &CallerIdentity) {
        self.organizations
            .deploy_multisig(first_admin, organization.id)
            .await
            .unwrap();
    }

    pub fn new_transaction(&self, amount: i64) -> NewTransaction {
        NewTransaction {
            description: "Office rent".to_string(),
            amount,
            destination: vec![0x5f, 0xbd, 0xb2, 0x31],
            max_fee_allowed: 10,
            deadline: self.clock.now() + Duration::hours(1),
        }
    }
}
