//! Shared test harness: in-memory database, scripted ledger stub, and
//! app-state assembly.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use serde_json::{json, Value};

use tokenflow_backend::jobs::validation_poller::{PollerConfig, ValidationPoller};
use tokenflow_backend::services::credential_store::CredentialStore;
use tokenflow_backend::services::intents::IntentService;
use tokenflow_backend::services::ledger::{
    LedgerClient, LedgerError, LookupOutcome, PreparedTx, SignedTx, SubmitResult, TxPayload,
};
use tokenflow_backend::services::signer_locks::SignerLocks;
use tokenflow_backend::services::step_executor::{ExecutorConfig, StepExecutor};
use tokenflow_backend::AppState;

pub const TEST_MASTER_KEY: [u8; 32] = [7u8; 32];
pub const TEST_ISSUER_SEED: &str = "sIssuerIntegrationSeed000001";

/// Fresh in-memory database with the real migrations applied.
pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    db
}

/// One recorded submit call.
#[derive(Debug, Clone)]
pub struct Submission {
    pub account: String,
    pub tx_type: String,
    pub tx_hash: String,
}

struct StubTx {
    tx_type: String,
    result: String,
    validate_after: Instant,
}

#[derive(Default)]
struct StubInner {
    sequence: u64,
    submissions: Vec<Submission>,
    txs: HashMap<String, StubTx>,
    /// Forced transaction result per tx type; default tesSUCCESS.
    results: HashMap<String, String>,
    /// Validation delay per tx type; default none.
    validation_delays: HashMap<String, Duration>,
    in_flight: HashSet<String>,
    exclusion_violations: usize,
    funded: HashSet<String>,
}

/// Deterministic in-memory ledger. Records the order of submit calls,
/// detects overlapping submissions from one account, and validates
/// transactions after a configurable per-type delay with a configurable
/// result code.
pub struct StubLedger {
    inner: Mutex<StubInner>,
    submit_delay: Duration,
}

impl StubLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StubInner::default()),
            submit_delay: Duration::ZERO,
        }
    }

    /// Hold each submit call open for `delay`, making overlapping
    /// same-signer submissions observable.
    pub fn with_submit_delay(delay: Duration) -> Self {
        Self {
            inner: Mutex::new(StubInner::default()),
            submit_delay: delay,
        }
    }

    /// Force the validated result for every transaction of this type.
    pub fn set_result(&self, tx_type: &str, result: &str) {
        self.inner
            .lock()
            .results
            .insert(tx_type.to_string(), result.to_string());
    }

    /// Keep transactions of this type unvalidated for `delay` after submit.
    pub fn set_validation_delay(&self, tx_type: &str, delay: Duration) {
        self.inner
            .lock()
            .validation_delays
            .insert(tx_type.to_string(), delay);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.inner.lock().submissions.clone()
    }

    /// Times a submit call started while another submission from the same
    /// account was still in flight. Must stay zero.
    pub fn exclusion_violations(&self) -> usize {
        self.inner.lock().exclusion_violations
    }

    fn stable_hash(input: &str) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        input.hash(&mut hasher);
        hasher.finish()
    }
}

#[async_trait]
impl LedgerClient for StubLedger {
    async fn prepare(&self, payload: TxPayload) -> Result<PreparedTx, LedgerError> {
        let sequence = {
            let mut inner = self.inner.lock();
            inner.sequence += 1;
            inner.sequence
        };
        let mut tx = payload.to_json();
        tx["Fee"] = json!("10");
        tx["Sequence"] = json!(sequence);
        tx["LastLedgerSequence"] = json!(9_999);
        Ok(PreparedTx { tx })
    }

    async fn sign(&self, prepared: &PreparedTx, seed: &str) -> Result<SignedTx, LedgerError> {
        if seed.trim().is_empty() {
            return Err(LedgerError::InvalidSeed("seed is empty".to_string()));
        }
        let blob = prepared.tx.to_string();
        let hash = format!("{:016X}", Self::stable_hash(&blob));
        Ok(SignedTx { blob, hash })
    }

    async fn submit(&self, blob: &str) -> Result<SubmitResult, LedgerError> {
        let tx: Value =
            serde_json::from_str(blob).map_err(|e| LedgerError::Malformed(e.to_string()))?;
        let account = tx["Account"].as_str().unwrap_or_default().to_string();
        let tx_type = tx["TransactionType"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        {
            let mut inner = self.inner.lock();
            if !inner.in_flight.insert(account.clone()) {
                inner.exclusion_violations += 1;
            }
        }

        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }

        let mut inner = self.inner.lock();
        inner.in_flight.remove(&account);
        inner.sequence += 1;
        let tx_hash = format!("STUBHASH{:08}", inner.sequence);

        let result = inner
            .results
            .get(&tx_type)
            .cloned()
            .unwrap_or_else(|| "tesSUCCESS".to_string());
        let delay = inner
            .validation_delays
            .get(&tx_type)
            .copied()
            .unwrap_or(Duration::ZERO);

        inner.txs.insert(
            tx_hash.clone(),
            StubTx {
                tx_type: tx_type.clone(),
                result,
                validate_after: Instant::now() + delay,
            },
        );
        inner.submissions.push(Submission {
            account,
            tx_type,
            tx_hash: tx_hash.clone(),
        });

        Ok(SubmitResult {
            tx_hash: tx_hash.clone(),
            engine_result: "tesSUCCESS".to_string(),
            acknowledgement: json!({
                "engine_result": "tesSUCCESS",
                "tx_json": { "hash": tx_hash },
            }),
            validated_ledger_index: None,
        })
    }

    async fn lookup(&self, tx_hash: &str) -> Result<LookupOutcome, LedgerError> {
        let inner = self.inner.lock();
        let Some(tx) = inner.txs.get(tx_hash) else {
            return Ok(LookupOutcome::NotFound);
        };
        if Instant::now() < tx.validate_after {
            return Ok(LookupOutcome::Pending);
        }

        let mut metadata = json!({ "TransactionResult": tx.result });
        if tx.tx_type == "MPTokenIssuanceCreate" && tx.result == "tesSUCCESS" {
            metadata["mpt_issuance_id"] = json!(format!("MPT{}", tx_hash));
        }
        Ok(LookupOutcome::Validated {
            result: tx.result.clone(),
            metadata,
        })
    }

    async fn fund(&self, address: &str) -> Result<(), LedgerError> {
        self.inner.lock().funded.insert(address.to_string());
        Ok(())
    }

    async fn balance(&self, address: &str) -> Result<Option<Decimal>, LedgerError> {
        if self.inner.lock().funded.contains(address) {
            Ok(Some(Decimal::from(10_000_000)))
        } else {
            Ok(None)
        }
    }

    fn derive_address(&self, seed: &str) -> Result<String, LedgerError> {
        if seed.trim().is_empty() {
            return Err(LedgerError::InvalidSeed("seed is empty".to_string()));
        }
        Ok(format!("r{:016x}", Self::stable_hash(seed)))
    }
}

/// Assemble the full application state over a stub ledger.
pub fn build_state(
    db: DatabaseConnection,
    ledger: Arc<StubLedger>,
    executor_config: ExecutorConfig,
) -> AppState {
    let ledger: Arc<dyn LedgerClient> = ledger;
    let credentials = Arc::new(CredentialStore::new(
        db.clone(),
        TEST_MASTER_KEY,
        TEST_ISSUER_SEED.to_string(),
        Duration::from_secs(3600),
    ));
    let signer_locks = Arc::new(SignerLocks::new());
    let executor = Arc::new(StepExecutor::new(
        db.clone(),
        ledger.clone(),
        credentials.clone(),
        signer_locks.clone(),
        executor_config,
    ));
    let intents = Arc::new(IntentService::new(db.clone(), executor));

    AppState {
        db,
        ledger,
        credentials,
        signer_locks,
        intents,
    }
}

/// A poller over the same database and stub, driven manually via
/// `sweep_once` in tests.
pub fn build_poller(db: DatabaseConnection, ledger: Arc<StubLedger>) -> ValidationPoller {
    ValidationPoller::new(
        db,
        ledger,
        PollerConfig {
            sweep_interval: Duration::from_millis(50),
            batch_size: 10,
        },
    )
}

/// Executor tuning that keeps the inline window short for tests.
pub fn fast_executor_config() -> ExecutorConfig {
    ExecutorConfig {
        poll_interval: Duration::from_millis(10),
        inline_timeout: Duration::from_millis(500),
    }
}
