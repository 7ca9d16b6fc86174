//! Request and response bodies exchanged with the settlement (chain) service.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployMultisigRequest {
    /// Owner public keys, `0x`-prefixed hex.
    pub owners: Vec<String>,
    pub confirmations: u32,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivePublicKeyRequest {
    pub seed_phrase: String,
}

impl std::fmt::Debug for DerivePublicKeyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivePublicKeyRequest")
            .field("seed_phrase", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySalariesRequest {
    pub authorized_wallet: String,
}

impl std::fmt::Debug for DeploySalariesRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploySalariesRequest")
            .field("authorized_wallet", &"<redacted>")
            .finish()
    }
}

/// Settlement intent for an authorized transaction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitTransactionRequest {
    /// Sent as the `Idempotency-Key` header, not in the body. One key per transaction,
    /// so a retried commit after a lost response is recognised by the service.
    #[serde(skip)]
    pub idempotency_key: Uuid,
    pub contract_address: String,
    /// `0x`-prefixed hex destination address.
    pub destination: String,
    pub value: i64,
    pub max_fee_allowed: i64,
    /// Unix seconds.
    pub deadline: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    pub tx_hash: String,
}

/// Error body returned by the settlement service on a non-success status.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementFailure {
    pub status_code: Option<u16>,
    #[serde(default)]
    pub message: serde_json::Value,
}

impl SettlementFailure {
    pub fn describe(&self) -> String {
        match &self.message {
            serde_json::Value::String(message) => message.clone(),
            serde_json::Value::Array(messages) => messages
                .iter()
                .map(|m| m.as_str().map(String::from).unwrap_or_else(|| m.to_string()))
                .collect::<Vec<_>>()
                .join("; "),
            serde_json::Value::Null => "no details".to_string(),
            other => other.to_string(),
        }
    }
}

/// Parses the `0x<hex>` body returned by public key derivation.
pub fn parse_public_key(body: &str) -> Option<Vec<u8>> {
    let trimmed = body.trim().trim_matches('"');
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_part.is_empty() {
        return None;
    }
    hex::decode(hex_part).ok()
}
