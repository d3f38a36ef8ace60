//! Ledger client adapter
//!
//! Single point of contact with the external settlement ledger. The engine
//! depends only on the `LedgerClient` trait; `HttpLedgerClient` is the
//! production implementation speaking JSON-RPC to the configured network.
//! Transaction result codes pass through verbatim ("tesSUCCESS", "tec…",
//! "tem…", "tef…"); a not-yet-in-a-ledger lookup is a normal signal, not an
//! error.

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::{Digest, Sha256, Sha512};
use std::str::FromStr;
use tracing::debug;

use crate::config::LedgerNetwork;

/// The only transaction result treated as success.
pub const TX_RESULT_SUCCESS: &str = "tesSUCCESS";

/// Ledgers ahead of current used for LastLedgerSequence autofill.
const LAST_LEDGER_WINDOW: u64 = 20;

/// Fallback fee in drops when the fee endpoint gives nothing usable.
const DEFAULT_FEE_DROPS: &str = "10";

/// Classify a validated transaction result.
pub fn is_validated_success(result: &str) -> bool {
    result == TX_RESULT_SUCCESS
}

/// Permanent ledger failures: malformed (tem), applied-with-error (tec),
/// failed (tef). Never retried.
pub fn is_permanent_failure(result: &str) -> bool {
    ["tem", "tec", "tef"]
        .iter()
        .any(|prefix| result.starts_with(prefix))
}

/// Errors from ledger interactions
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Transport or node-side error; transient from the engine's view.
    #[error("Ledger RPC error: {0}")]
    Rpc(String),

    #[error("Invalid signing seed: {0}")]
    InvalidSeed(String),

    #[error("Unexpected ledger response: {0}")]
    Malformed(String),

    #[error("Faucet unavailable: {0}")]
    FaucetUnavailable(String),
}

/// A transaction the engine wants to submit, before autofill.
#[derive(Debug, Clone)]
pub struct TxPayload {
    /// Ledger transaction type, passed through verbatim.
    pub tx_type: String,
    /// Signing account address.
    pub account: String,
    /// Type-specific fields (flags, amounts, destinations, ...).
    pub fields: Value,
}

impl TxPayload {
    pub fn new(tx_type: impl Into<String>, account: impl Into<String>, fields: Value) -> Self {
        Self {
            tx_type: tx_type.into(),
            account: account.into(),
            fields,
        }
    }

    /// Full transaction JSON: TransactionType + Account + fields.
    pub fn to_json(&self) -> Value {
        let mut tx = json!({
            "TransactionType": self.tx_type,
            "Account": self.account,
        });
        if let (Some(target), Some(extra)) = (tx.as_object_mut(), self.fields.as_object()) {
            for (key, value) in extra {
                target.insert(key.clone(), value.clone());
            }
        }
        tx
    }
}

/// Transaction with fee, sequence and expiry autofilled.
#[derive(Debug, Clone)]
pub struct PreparedTx {
    pub tx: Value,
}

/// Signed transaction blob plus its canonical hash.
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub blob: String,
    pub hash: String,
}

/// Tentative acceptance record returned by submit.
#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub tx_hash: String,
    /// Preliminary engine result; final status comes from lookup.
    pub engine_result: String,
    /// Raw acknowledgement, kept for audit.
    pub acknowledgement: Value,
    pub validated_ledger_index: Option<u64>,
}

/// Outcome of a transaction lookup.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    /// Not yet in any ledger; benign, retry later.
    NotFound,
    /// Known but not yet validated.
    Pending,
    /// Included in a validated ledger with a final result code.
    Validated { result: String, metadata: Value },
}

/// Contract the engine holds against the settlement ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Autofill fee, sequence and last-ledger-sequence.
    async fn prepare(&self, payload: TxPayload) -> Result<PreparedTx, LedgerError>;

    /// Sign a prepared transaction with the given seed.
    async fn sign(&self, prepared: &PreparedTx, seed: &str) -> Result<SignedTx, LedgerError>;

    /// Submit a signed blob.
    async fn submit(&self, blob: &str) -> Result<SubmitResult, LedgerError>;

    /// Query validation status for a transaction hash.
    async fn lookup(&self, tx_hash: &str) -> Result<LookupOutcome, LedgerError>;

    /// Fund an address from the test-network faucet.
    async fn fund(&self, address: &str) -> Result<(), LedgerError>;

    /// Balance in drops; None when the account does not exist yet.
    async fn balance(&self, address: &str) -> Result<Option<Decimal>, LedgerError>;

    /// Deterministic address for a seed.
    fn derive_address(&self, seed: &str) -> Result<String, LedgerError>;
}

/// Derive the signing key for a seed.
fn signing_key_from_seed(seed: &str) -> Result<SigningKey, LedgerError> {
    if seed.trim().is_empty() {
        return Err(LedgerError::InvalidSeed("seed is empty".to_string()));
    }
    let digest: [u8; 32] = Sha256::digest(seed.as_bytes()).into();
    Ok(SigningKey::from_bytes(&digest))
}

/// Canonical transaction hash: SHA-512 half over the prefixed blob.
fn hash_signed_blob(blob: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(b"TXN\0");
    hasher.update(blob.as_bytes());
    let digest = hasher.finalize();
    hex::encode_upper(&digest[..32])
}

/// Production adapter: JSON-RPC over HTTPS.
pub struct HttpLedgerClient {
    network: LedgerNetwork,
    client: reqwest::Client,
}

impl HttpLedgerClient {
    pub fn new(network: LedgerNetwork) -> Self {
        Self {
            network,
            client: reqwest::Client::new(),
        }
    }

    pub fn network(&self) -> LedgerNetwork {
        self.network
    }

    /// Issue one JSON-RPC call and unwrap the `result` envelope.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let body = json!({ "method": method, "params": [params] });
        let response = self
            .client
            .post(self.network.rpc_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| LedgerError::Malformed("response carries no result".to_string()))
    }

    async fn base_fee(&self) -> Result<String, LedgerError> {
        let result = self.rpc("fee", json!({})).await?;
        Ok(result
            .pointer("/drops/base_fee")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_FEE_DROPS)
            .to_string())
    }

    async fn account_sequence(&self, address: &str) -> Result<u64, LedgerError> {
        let result = self
            .rpc(
                "account_info",
                json!({ "account": address, "ledger_index": "current" }),
            )
            .await?;
        if result.get("error").and_then(Value::as_str) == Some("actNotFound") {
            return Err(LedgerError::Rpc(format!(
                "account {} not found on ledger",
                address
            )));
        }
        result
            .pointer("/account_data/Sequence")
            .and_then(Value::as_u64)
            .ok_or_else(|| LedgerError::Malformed("account_info carries no Sequence".to_string()))
    }

    async fn current_ledger_index(&self) -> Result<u64, LedgerError> {
        let result = self.rpc("ledger_current", json!({})).await?;
        result
            .get("ledger_current_index")
            .and_then(Value::as_u64)
            .ok_or_else(|| LedgerError::Malformed("no current ledger index".to_string()))
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn prepare(&self, payload: TxPayload) -> Result<PreparedTx, LedgerError> {
        let account = payload.account.clone();
        let mut tx = payload.to_json();

        if tx.get("Fee").is_none() {
            tx["Fee"] = json!(self.base_fee().await?);
        }
        if tx.get("Sequence").is_none() {
            tx["Sequence"] = json!(self.account_sequence(&account).await?);
        }
        if tx.get("LastLedgerSequence").is_none() {
            tx["LastLedgerSequence"] = json!(self.current_ledger_index().await? + LAST_LEDGER_WINDOW);
        }

        Ok(PreparedTx { tx })
    }

    async fn sign(&self, prepared: &PreparedTx, seed: &str) -> Result<SignedTx, LedgerError> {
        let signing_key = signing_key_from_seed(seed)?;

        let mut tx = prepared.tx.clone();
        tx["SigningPubKey"] = json!(hex::encode_upper(signing_key.verifying_key().to_bytes()));

        // serde_json objects iterate in sorted key order, so this
        // serialization is canonical for a given transaction.
        let message =
            serde_json::to_vec(&tx).map_err(|e| LedgerError::Malformed(e.to_string()))?;
        let signature = signing_key.sign(&message);
        tx["TxnSignature"] = json!(hex::encode_upper(signature.to_bytes()));

        let blob_bytes =
            serde_json::to_vec(&tx).map_err(|e| LedgerError::Malformed(e.to_string()))?;
        let blob = hex::encode_upper(blob_bytes);
        let hash = hash_signed_blob(&blob);

        Ok(SignedTx { blob, hash })
    }

    async fn submit(&self, blob: &str) -> Result<SubmitResult, LedgerError> {
        let result = self.rpc("submit", json!({ "tx_blob": blob })).await?;

        if let Some(error) = result.get("error").and_then(Value::as_str) {
            return Err(LedgerError::Rpc(format!("submit rejected: {}", error)));
        }

        let engine_result = result
            .get("engine_result")
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::Malformed("submit carries no engine_result".to_string()))?
            .to_string();

        let tx_hash = result
            .pointer("/tx_json/hash")
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::Malformed("submit carries no tx hash".to_string()))?
            .to_string();

        debug!(tx_hash = %tx_hash, engine_result = %engine_result, "Transaction submitted");

        Ok(SubmitResult {
            tx_hash,
            engine_result,
            validated_ledger_index: result.get("validated_ledger_index").and_then(Value::as_u64),
            acknowledgement: result,
        })
    }

    async fn lookup(&self, tx_hash: &str) -> Result<LookupOutcome, LedgerError> {
        let result = self
            .rpc("tx", json!({ "transaction": tx_hash, "binary": false }))
            .await?;

        if result.get("error").and_then(Value::as_str) == Some("txnNotFound") {
            return Ok(LookupOutcome::NotFound);
        }
        if let Some(error) = result.get("error").and_then(Value::as_str) {
            return Err(LedgerError::Rpc(format!("tx lookup failed: {}", error)));
        }

        if !result
            .get("validated")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Ok(LookupOutcome::Pending);
        }

        let metadata = result.get("meta").cloned().unwrap_or(Value::Null);
        let tx_result = metadata
            .get("TransactionResult")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LedgerError::Malformed("validated tx carries no TransactionResult".to_string())
            })?
            .to_string();

        Ok(LookupOutcome::Validated {
            result: tx_result,
            metadata,
        })
    }

    async fn fund(&self, address: &str) -> Result<(), LedgerError> {
        let faucet = self.network.faucet_url().ok_or_else(|| {
            LedgerError::FaucetUnavailable(format!("no faucet on {}", self.network))
        })?;

        let response = self
            .client
            .post(faucet)
            .json(&json!({ "destination": address }))
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Rpc(format!(
                "faucet returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn balance(&self, address: &str) -> Result<Option<Decimal>, LedgerError> {
        let result = self
            .rpc(
                "account_info",
                json!({ "account": address, "ledger_index": "validated" }),
            )
            .await?;

        if result.get("error").and_then(Value::as_str) == Some("actNotFound") {
            return Ok(None);
        }

        let drops = result
            .pointer("/account_data/Balance")
            .and_then(Value::as_str)
            .ok_or_else(|| LedgerError::Malformed("account_info carries no Balance".to_string()))?;

        let balance = Decimal::from_str(drops)
            .map_err(|e| LedgerError::Malformed(format!("unparseable balance: {}", e)))?;
        Ok(Some(balance))
    }

    fn derive_address(&self, seed: &str) -> Result<String, LedgerError> {
        let signing_key = signing_key_from_seed(seed)?;
        let digest = Sha256::digest(signing_key.verifying_key().to_bytes());
        let encoded = hex::encode(digest);
        Ok(format!("r{}", &encoded[..33]))
    }
}
