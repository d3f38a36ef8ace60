//! Step executor
//!
//! Drives one operation to a terminal status: iterates its steps in order,
//! skipping those already validated, and for each remaining step resolves
//! the signer seed, builds the ledger transaction, submits it under the
//! signer's exclusive lock, and waits a bounded window for validation.
//! An inline timeout halts the loop and leaves the step to the background
//! poller; the operation stays IN_PROGRESS until the poller resolves it.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::entities::{operation_steps, operations, wallets};
use crate::models::operation::{OperationStatus, StepKind, StepStatus};
use crate::models::ISSUER_WALLET_ID;
use crate::services::credential_store::CredentialStore;
use crate::services::ledger::{self, LedgerClient, LookupOutcome, TxPayload};
use crate::services::signer_locks::SignerLocks;
use crate::services::transitions;

/// tfMPTCanTransfer
const MPT_CAN_TRANSFER: u32 = 0x20;

/// tfMPTCanClawback
const MPT_CAN_CLAWBACK: u32 = 0x40;

/// Issuance flags for minted token classes: transferable and clawable.
const MINT_ISSUANCE_FLAGS: u32 = MPT_CAN_TRANSFER | MPT_CAN_CLAWBACK;

/// Metadata field carrying the ledger-assigned issuance identifier.
const ISSUANCE_ID_FIELD: &str = "mpt_issuance_id";

/// Tunables for the inline validation wait
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Interval between lookup attempts inside the inline wait.
    pub poll_interval: Duration,
    /// Wall-clock budget for the inline wait before handing the step to
    /// the background poller.
    pub inline_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            inline_timeout: Duration::from_secs(15),
        }
    }
}

/// Errors that abort execution without a recorded operation outcome
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Operation not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

enum StepOutcome {
    Success,
    Failed { message: String },
    TimedOut,
}

/// Addresses and intent data a step payload is built from.
pub(crate) struct StepContext<'a> {
    pub issuer_address: &'a str,
    pub source_address: Option<&'a str>,
    pub destination_address: Option<&'a str>,
    pub amount: &'a str,
    pub issuance_id: Option<&'a str>,
    pub metadata: Option<&'a str>,
}

pub struct StepExecutor {
    db: DatabaseConnection,
    ledger: Arc<dyn LedgerClient>,
    credentials: Arc<CredentialStore>,
    locks: Arc<SignerLocks>,
    config: ExecutorConfig,
    /// Operations currently being driven by this process. A second
    /// `execute` for the same operation (an idempotent replay racing the
    /// original) is a no-op instead of a double-submission.
    running: parking_lot::Mutex<std::collections::HashSet<String>>,
}

impl StepExecutor {
    pub fn new(
        db: DatabaseConnection,
        ledger: Arc<dyn LedgerClient>,
        credentials: Arc<CredentialStore>,
        locks: Arc<SignerLocks>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            db,
            ledger,
            credentials,
            locks,
            config,
            running: parking_lot::Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Drive the operation to a terminal status, or as far as the inline
    /// validation budget allows.
    pub async fn execute(&self, operation_id: &str) -> Result<(), ExecutorError> {
        if !self.running.lock().insert(operation_id.to_string()) {
            info!(operation_id = %operation_id, "Executor already active for operation");
            return Ok(());
        }
        let result = self.execute_inner(operation_id).await;
        self.running.lock().remove(operation_id);
        result
    }

    async fn execute_inner(&self, operation_id: &str) -> Result<(), ExecutorError> {
        let operation = self.load_operation(operation_id).await?;
        if let Ok(status) = operation.status.parse::<OperationStatus>() {
            if status.is_terminal() {
                return Ok(());
            }
        }

        transitions::set_operation_in_progress(&self.db, operation_id).await?;

        let steps = operation_steps::Entity::find()
            .filter(operation_steps::Column::OperationId.eq(operation_id))
            .order_by_asc(operation_steps::Column::StepNo)
            .all(&self.db)
            .await?;

        for step in steps {
            // Re-read each round: a mint's issuance id appears after step 1.
            let operation = self.load_operation(operation_id).await?;

            let current: StepStatus = step.status.parse().unwrap_or(StepStatus::Pending);
            let outcome = match (current, step.tx_hash.as_deref()) {
                // Resume point after a restart: already validated, just make
                // sure a mint step 1 left its issuance id behind.
                (StepStatus::ValidatedSuccess, _) => StepOutcome::Success,
                (StepStatus::ValidatedFailed, _) | (StepStatus::Timeout, _) => {
                    StepOutcome::Failed {
                        message: "already terminally failed".to_string(),
                    }
                }
                // Submitted before a restart or replay: never submit twice,
                // re-enter the wait on the recorded hash.
                (StepStatus::Submitted, Some(tx_hash))
                | (StepStatus::PendingValidation, Some(tx_hash)) => {
                    self.wait_for_validation(&step.id, tx_hash).await
                }
                _ => self.run_step(&operation, &step).await,
            };

            match outcome {
                StepOutcome::Success => {
                    if let Err(message) =
                        self.record_issuance_if_mint_create(&operation, &step.id).await
                    {
                        transitions::fail_operation(
                            &self.db,
                            operation_id,
                            "ISSUANCE_DISCOVERY_FAILED",
                            &format!("step {}: {}", step.step_no, message),
                        )
                        .await?;
                        return Ok(());
                    }
                }
                StepOutcome::Failed { message } => {
                    transitions::fail_operation(
                        &self.db,
                        operation_id,
                        "STEP_FAILED",
                        &format!("step {} failed: {}", step.step_no, message),
                    )
                    .await?;
                    return Ok(());
                }
                StepOutcome::TimedOut => {
                    info!(
                        operation_id = %operation_id,
                        step_no = step.step_no,
                        "Inline validation window expired; background poller takes over"
                    );
                    return Ok(());
                }
            }
        }

        transitions::complete_operation(&self.db, operation_id).await?;
        info!(operation_id = %operation_id, "Operation completed");
        Ok(())
    }

    async fn load_operation(
        &self,
        operation_id: &str,
    ) -> Result<operations::Model, ExecutorError> {
        operations::Entity::find_by_id(operation_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ExecutorError::NotFound(operation_id.to_string()))
    }

    /// One step: resolve seed → build payload → submit under the signer
    /// lock → bounded validation wait. Every failure maps to an outcome;
    /// nothing escapes as a raw error.
    async fn run_step(
        &self,
        operation: &operations::Model,
        step: &operation_steps::Model,
    ) -> StepOutcome {
        let signer_id = step.signer_wallet_id.as_deref().unwrap_or(ISSUER_WALLET_ID);

        let seed = match self.credentials.fetch_seed(signer_id).await {
            Ok(seed) => seed,
            Err(e) => {
                return StepOutcome::Failed {
                    message: format!("signer credential unavailable: {}", e),
                }
            }
        };

        let payload = match self.build_payload(operation, step).await {
            Ok(payload) => payload,
            Err(message) => return StepOutcome::Failed { message },
        };

        // The lock covers prepare/sign/submit and the SUBMITTED record:
        // the next transaction for this signer must not read its account
        // sequence until this submission is acknowledged and persisted.
        let guard = self.locks.acquire(signer_id).await;

        let prepared = match self.ledger.prepare(payload).await {
            Ok(prepared) => prepared,
            Err(e) => {
                return StepOutcome::Failed {
                    message: format!("prepare failed: {}", e),
                }
            }
        };
        let signed = match self.ledger.sign(&prepared, &seed).await {
            Ok(signed) => signed,
            Err(e) => {
                return StepOutcome::Failed {
                    message: format!("sign failed: {}", e),
                }
            }
        };
        let submitted = match self.ledger.submit(&signed.blob).await {
            Ok(submitted) => submitted,
            Err(e) => {
                return StepOutcome::Failed {
                    message: format!("submit failed: {}", e),
                }
            }
        };

        if let Err(e) = transitions::mark_step_submitted(
            &self.db,
            &step.id,
            &submitted.tx_hash,
            submitted.acknowledgement.clone(),
        )
        .await
        {
            return StepOutcome::Failed {
                message: format!("recording submission failed: {}", e),
            };
        }

        drop(guard);

        // Wait begins; validation no longer needs the signer.
        if let Err(e) =
            transitions::advance_step(&self.db, &step.id, StepStatus::PendingValidation, None).await
        {
            return StepOutcome::Failed {
                message: format!("recording validation wait failed: {}", e),
            };
        }

        self.wait_for_validation(&step.id, &submitted.tx_hash).await
    }

    /// Poll the ledger until the transaction validates or the inline budget
    /// runs out. Adapter errors other than the benign not-yet-found signal
    /// are logged and treated as transient.
    async fn wait_for_validation(&self, step_id: &str, tx_hash: &str) -> StepOutcome {
        let deadline = Instant::now() + self.config.inline_timeout;

        loop {
            match self.ledger.lookup(tx_hash).await {
                Ok(LookupOutcome::Validated { result, metadata }) => {
                    let (status, outcome) = if ledger::is_validated_success(&result) {
                        (StepStatus::ValidatedSuccess, StepOutcome::Success)
                    } else {
                        (
                            StepStatus::ValidatedFailed,
                            StepOutcome::Failed {
                                message: format!("transaction result {}", result),
                            },
                        )
                    };
                    if let Err(e) =
                        transitions::advance_step(&self.db, step_id, status, Some(metadata)).await
                    {
                        return StepOutcome::Failed {
                            message: format!("recording validation failed: {}", e),
                        };
                    }
                    return outcome;
                }
                Ok(LookupOutcome::NotFound) | Ok(LookupOutcome::Pending) => {
                    let _ = transitions::touch_step_checked(&self.db, step_id).await;
                }
                Err(e) => {
                    warn!(tx_hash = %tx_hash, error = %e, "Transient lookup failure during inline wait");
                }
            }

            if Instant::now() >= deadline {
                return StepOutcome::TimedOut;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// After a mint's issuance-create step validates, pull the
    /// ledger-assigned issuance id out of the validated metadata and pin it
    /// on the operation. Steps 2 and 3 read it from there.
    async fn record_issuance_if_mint_create(
        &self,
        operation: &operations::Model,
        step_id: &str,
    ) -> Result<(), String> {
        if operation.issuance_id.is_some() {
            return Ok(());
        }

        let step = operation_steps::Entity::find_by_id(step_id)
            .one(&self.db)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("operation step {} disappeared", step_id))?;

        if step.kind.parse::<StepKind>() != Ok(StepKind::IssuerMint) {
            return Ok(());
        }

        let issuance_id = step
            .validated_result
            .as_ref()
            .and_then(extract_issuance_id)
            .ok_or_else(|| {
                format!(
                    "validated metadata carries no {} field",
                    ISSUANCE_ID_FIELD
                )
            })?;

        transitions::persist_issuance_id(&self.db, &operation.id, &issuance_id)
            .await
            .map_err(|e| e.to_string())?;
        info!(
            operation_id = %operation.id,
            issuance_id = %issuance_id,
            "Issuance identifier discovered"
        );
        Ok(())
    }

    async fn build_payload(
        &self,
        operation: &operations::Model,
        step: &operation_steps::Model,
    ) -> Result<TxPayload, String> {
        let kind: StepKind = step.kind.parse()?;

        let issuer_address = self.wallet_address(ISSUER_WALLET_ID).await?;
        let source_address = match operation.source_wallet_id.as_deref() {
            Some(id) => Some(self.wallet_address(id).await?),
            None => None,
        };
        let destination_address = match operation.destination_wallet_id.as_deref() {
            Some(id) => Some(self.wallet_address(id).await?),
            None => None,
        };

        build_step_payload(
            kind,
            &StepContext {
                issuer_address: &issuer_address,
                source_address: source_address.as_deref(),
                destination_address: destination_address.as_deref(),
                amount: &operation.amount,
                issuance_id: operation.issuance_id.as_deref(),
                metadata: operation.metadata.as_deref(),
            },
        )
    }

    /// Ledger address for a wallet identity; the issuer's is derived from
    /// the configured seed, user addresses come from their custody record.
    async fn wallet_address(&self, wallet_id: &str) -> Result<String, String> {
        if wallet_id == ISSUER_WALLET_ID {
            let seed = self
                .credentials
                .fetch_seed(ISSUER_WALLET_ID)
                .await
                .map_err(|e| e.to_string())?;
            return self
                .ledger
                .derive_address(&seed)
                .map_err(|e| e.to_string());
        }

        let wallet = wallets::Entity::find_by_id(wallet_id)
            .one(&self.db)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("wallet {} not found", wallet_id))?;
        Ok(wallet.address)
    }
}

/// Ledger-assigned issuance identifier from validated transaction metadata.
pub(crate) fn extract_issuance_id(metadata: &Value) -> Option<String> {
    metadata
        .get(ISSUANCE_ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Build the ledger transaction for one step role.
pub(crate) fn build_step_payload(
    kind: StepKind,
    ctx: &StepContext<'_>,
) -> Result<TxPayload, String> {
    match kind {
        StepKind::IssuerMint => {
            let mut fields = json!({
                "Flags": MINT_ISSUANCE_FLAGS,
                "AssetScale": 0,
                "TransferFee": 0,
                "MaximumAmount": ctx.amount,
            });
            if let Some(metadata) = ctx.metadata {
                fields["MPTokenMetadata"] = json!(hex::encode_upper(metadata.as_bytes()));
            }
            Ok(TxPayload::new(
                "MPTokenIssuanceCreate",
                ctx.issuer_address,
                fields,
            ))
        }
        StepKind::UserAuthorize | StepKind::ReceiverAuthorize => {
            let account = ctx
                .destination_address
                .ok_or("authorize step has no destination wallet")?;
            let issuance_id = ctx
                .issuance_id
                .ok_or("authorize step requires an issuance id")?;
            Ok(TxPayload::new(
                "MPTokenAuthorize",
                account,
                json!({ "MPTokenIssuanceID": issuance_id }),
            ))
        }
        StepKind::IssuerTransfer | StepKind::SenderTransfer => {
            let account = if kind == StepKind::IssuerTransfer {
                ctx.issuer_address
            } else {
                ctx.source_address
                    .ok_or("transfer step has no source wallet")?
            };
            let destination = ctx
                .destination_address
                .ok_or("transfer step has no destination wallet")?;
            let issuance_id = ctx
                .issuance_id
                .ok_or("transfer step requires an issuance id")?;
            Ok(TxPayload::new(
                "Payment",
                account,
                json!({
                    "Destination": destination,
                    "Amount": { "mpt_issuance_id": issuance_id, "value": ctx.amount },
                }),
            ))
        }
        StepKind::IssuerClawback => {
            let holder = ctx
                .destination_address
                .ok_or("clawback step has no holder wallet")?;
            let issuance_id = ctx
                .issuance_id
                .ok_or("clawback step requires an issuance id")?;
            Ok(TxPayload::new(
                "Clawback",
                ctx.issuer_address,
                json!({
                    "Holder": holder,
                    "Amount": { "mpt_issuance_id": issuance_id, "value": ctx.amount },
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>() -> StepContext<'a> {
        StepContext {
            issuer_address: "rIssuerAddress",
            source_address: Some("rSourceAddress"),
            destination_address: Some("rDestAddress"),
            amount: "1000",
            issuance_id: Some("00000001ABCD"),
            metadata: None,
        }
    }

    #[test]
    fn test_mint_create_fixes_scale_and_fee() {
        let payload = build_step_payload(StepKind::IssuerMint, &context()).unwrap();
        assert_eq!(payload.tx_type, "MPTokenIssuanceCreate");
        assert_eq!(payload.account, "rIssuerAddress");
        assert_eq!(payload.fields["Flags"], 96);
        assert_eq!(payload.fields["AssetScale"], 0);
        assert_eq!(payload.fields["TransferFee"], 0);
        assert_eq!(payload.fields["MaximumAmount"], "1000");
        assert!(payload.fields.get("MPTokenMetadata").is_none());
    }

    #[test]
    fn test_mint_create_hex_encodes_metadata() {
        let mut ctx = context();
        ctx.metadata = Some("hi");
        let payload = build_step_payload(StepKind::IssuerMint, &ctx).unwrap();
        assert_eq!(payload.fields["MPTokenMetadata"], "6869");
    }

    #[test]
    fn test_authorize_signed_by_destination() {
        let payload = build_step_payload(StepKind::ReceiverAuthorize, &context()).unwrap();
        assert_eq!(payload.tx_type, "MPTokenAuthorize");
        assert_eq!(payload.account, "rDestAddress");
        assert_eq!(payload.fields["MPTokenIssuanceID"], "00000001ABCD");
    }

    #[test]
    fn test_authorize_requires_issuance_id() {
        let mut ctx = context();
        ctx.issuance_id = None;
        assert!(build_step_payload(StepKind::UserAuthorize, &ctx).is_err());
    }

    #[test]
    fn test_sender_transfer_moves_issuance_amount() {
        let payload = build_step_payload(StepKind::SenderTransfer, &context()).unwrap();
        assert_eq!(payload.tx_type, "Payment");
        assert_eq!(payload.account, "rSourceAddress");
        assert_eq!(payload.fields["Destination"], "rDestAddress");
        assert_eq!(payload.fields["Amount"]["mpt_issuance_id"], "00000001ABCD");
        assert_eq!(payload.fields["Amount"]["value"], "1000");
    }

    #[test]
    fn test_issuer_transfer_signed_by_issuer() {
        let payload = build_step_payload(StepKind::IssuerTransfer, &context()).unwrap();
        assert_eq!(payload.account, "rIssuerAddress");
    }

    #[test]
    fn test_clawback_names_holder() {
        let payload = build_step_payload(StepKind::IssuerClawback, &context()).unwrap();
        assert_eq!(payload.tx_type, "Clawback");
        assert_eq!(payload.account, "rIssuerAddress");
        assert_eq!(payload.fields["Holder"], "rDestAddress");
    }

    #[test]
    fn test_extract_issuance_id() {
        let metadata = json!({
            "TransactionResult": "tesSUCCESS",
            "mpt_issuance_id": "00000001ABCD",
        });
        assert_eq!(
            extract_issuance_id(&metadata),
            Some("00000001ABCD".to_string())
        );
        assert_eq!(extract_issuance_id(&json!({})), None);
    }
}
