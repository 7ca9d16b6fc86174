use crate::auth::identity::CallerIdentity;
use crate::core::errors::AccountingError;
use crate::core::models::user::Seed;
use crate::infrastructure::settlement::SettlementGateway;
use crate::infrastructure::settlement::types::{
    CommitReceipt, CommitTransactionRequest, DeployMultisigRequest, DeploySalariesRequest, DeployedContract,
    DerivePublicKeyRequest, SettlementFailure, parse_public_key,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const SEED_HEADER: &str = "X-Seed";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// HTTP client for the chain API that deploys and drives multisig wallets.
#[derive(Clone)]
pub struct ChainApiGateway {
    client: Client,
    host: String,
}

impl ChainApiGateway {
    /// Every request, including reading the response body, is bounded by `timeout`.
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self, AccountingError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| AccountingError::InternalServerError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    async fn post<B: Serialize + std::fmt::Debug>(
        &self,
        path: &str,
        body: &B,
        seed: Option<&Seed>,
        idempotency_key: Option<String>,
    ) -> Result<Response, AccountingError> {
        let endpoint = self.endpoint(path);
        debug!(endpoint = %endpoint, body = ?body, "settlement request");

        let mut request = self.client.post(&endpoint).json(body);
        if let Some(seed) = seed {
            request = request.header(SEED_HEADER, seed.to_hex());
        }
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(endpoint = %endpoint, error = %e, "settlement request failed");
            transport_error(e)
        })?;

        debug!(endpoint = %endpoint, code = response.status().as_u16(), "settlement response");
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(failure(response).await)
        }
    }

    async fn post_json<B: Serialize + std::fmt::Debug, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        seed: Option<&Seed>,
        idempotency_key: Option<String>,
    ) -> Result<R, AccountingError> {
        let response = self.post(path, body, seed, idempotency_key).await?;
        response.json::<R>().await.map_err(|e| {
            if e.is_timeout() {
                AccountingError::SettlementUnavailable(format!("timed out reading response: {}", e))
            } else {
                AccountingError::InvalidResponse(e.to_string())
            }
        })
    }
}

fn transport_error(error: reqwest::Error) -> AccountingError {
    if error.is_timeout() {
        AccountingError::SettlementUnavailable(format!("request timed out: {}", error))
    } else if error.is_connect() {
        AccountingError::SettlementUnavailable(format!("cannot connect: {}", error))
    } else {
        AccountingError::SettlementUnavailable(error.to_string())
    }
}

/// 503 and 504 mean the service could not act at all and are retryable; any other
/// non-success status is an explicit rejection.
async fn failure(response: Response) -> AccountingError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<SettlementFailure>(&body)
        .map(|f| f.describe())
        .unwrap_or_else(|_| if body.is_empty() { "no details".to_string() } else { body });

    match status {
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            AccountingError::SettlementUnavailable(format!("status {}: {}", status.as_u16(), message))
        }
        _ => AccountingError::SettlementRejected {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl SettlementGateway for ChainApiGateway {
    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    async fn deploy_multisig_wallet(
        &self,
        caller: &CallerIdentity,
        request: DeployMultisigRequest,
    ) -> Result<DeployedContract, AccountingError> {
        self.post_json("/multi-sig/deploy", &request, Some(&caller.seed), None)
            .await
    }

    #[instrument(skip_all)]
    async fn derive_public_key(&self, seed_phrase: &str) -> Result<Vec<u8>, AccountingError> {
        let request = DerivePublicKeyRequest {
            seed_phrase: seed_phrase.to_string(),
        };
        let response = self.post("/address-from-seed", &request, None, None).await?;
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AccountingError::SettlementUnavailable(format!("timed out reading response: {}", e))
            } else {
                AccountingError::InvalidResponse(e.to_string())
            }
        })?;

        parse_public_key(&body)
            .ok_or_else(|| AccountingError::InvalidResponse(format!("cannot parse public key from `{}`", body.trim())))
    }

    #[instrument(skip(self, caller, request), fields(caller = %caller.user_id))]
    async fn submit_salary_deployment_unchecked(
        &self,
        caller: &CallerIdentity,
        request: DeploySalariesRequest,
    ) -> Result<DeployedContract, AccountingError> {
        self.post_json("/salaries/deploy", &request, Some(&caller.seed), None)
            .await
    }

    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    async fn commit_transaction(
        &self,
        caller: &CallerIdentity,
        request: CommitTransactionRequest,
    ) -> Result<CommitReceipt, AccountingError> {
        let idempotency_key = request.idempotency_key.to_string();
        self.post_json(
            "/multi-sig/submit-transaction",
            &request,
            Some(&caller.seed),
            Some(idempotency_key),
        )
        .await
    }
}
