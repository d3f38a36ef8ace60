//! Intent front-door
//!
//! Validates mint/transfer/burn intents, enforces the idempotency
//! contract, materializes the operation and its ordered steps in a single
//! transaction, and hands the operation to the step executor
//! asynchronously. The caller gets the operation id and PENDING status
//! immediately; an idempotent replay gets the existing operation instead.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, SqlErr, TransactionTrait,
};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::entities::{operation_steps, operations, wallets};
use crate::models::operation::{
    BurnRequest, MintRequest, OperationKind, OperationStatus, StepKind, StepStatus,
    TransferRequest,
};
use crate::models::ISSUER_WALLET_ID;
use crate::services::redaction;
use crate::services::step_executor::StepExecutor;

/// Errors surfaced by intent submission
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

/// Result of accepting an intent
pub struct IntentOutcome {
    pub operation: operations::Model,
    pub steps: Vec<operation_steps::Model>,
    /// True when the idempotency token matched an existing operation and
    /// nothing new was created.
    pub replayed: bool,
}

pub struct IntentService {
    db: DatabaseConnection,
    executor: Arc<StepExecutor>,
}

impl IntentService {
    pub fn new(db: DatabaseConnection, executor: Arc<StepExecutor>) -> Self {
        Self { db, executor }
    }

    /// MINT: create an issuance, have the destination authorize it, pay
    /// the full amount from the issuer to the destination.
    pub async fn submit_mint(&self, request: MintRequest) -> Result<IntentOutcome, IntentError> {
        let deprecated = request.deprecated_fields();
        if !deprecated.is_empty() {
            return Err(IntentError::InvalidArgument(format!(
                "deprecated fields: {} (these values are fixed by the orchestrator)",
                deprecated.join(", ")
            )));
        }

        let idempotency_key = require(request.idempotency_key.as_deref(), "idempotencyKey")?;
        let user_wallet_id = require(request.user_wallet_id.as_deref(), "userWalletId")?;
        let amount = require(request.amount.as_deref(), "amount")?;
        validate_amount(amount)?;
        self.require_wallet(user_wallet_id).await?;

        info!(
            intent = %redaction::guard(&json!({
                "kind": "MINT",
                "idempotencyKey": idempotency_key,
                "userWalletId": user_wallet_id,
                "amount": amount,
            })),
            "Mint intent received"
        );

        if let Some(existing) = self.find_by_idempotency_key(idempotency_key).await? {
            return Ok(existing);
        }

        let operation = new_operation(
            OperationKind::Mint,
            idempotency_key,
            None,
            None,
            Some(user_wallet_id),
            amount,
            request.metadata.as_deref(),
        );
        let steps = vec![
            new_step(&operation.id, 1, StepKind::IssuerMint, Some(ISSUER_WALLET_ID), "MPTokenIssuanceCreate"),
            new_step(&operation.id, 2, StepKind::UserAuthorize, Some(user_wallet_id), "MPTokenAuthorize"),
            new_step(&operation.id, 3, StepKind::IssuerTransfer, Some(ISSUER_WALLET_ID), "Payment"),
        ];

        self.materialize(operation, steps, idempotency_key).await
    }

    /// TRANSFER: destination authorizes the issuance, then the source pays.
    pub async fn submit_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<IntentOutcome, IntentError> {
        let idempotency_key = require(request.idempotency_key.as_deref(), "idempotencyKey")?;
        let source_wallet_id = require(request.source_wallet_id.as_deref(), "sourceWalletId")?;
        let destination_wallet_id = require(
            request.destination_wallet_id.as_deref(),
            "destinationWalletId",
        )?;
        let issuance_id = require(request.issuance_id.as_deref(), "issuanceId")?;
        let amount = require(request.amount.as_deref(), "amount")?;
        validate_amount(amount)?;
        self.require_wallet(source_wallet_id).await?;
        self.require_wallet(destination_wallet_id).await?;

        info!(
            intent = %redaction::guard(&json!({
                "kind": "TRANSFER",
                "idempotencyKey": idempotency_key,
                "sourceWalletId": source_wallet_id,
                "destinationWalletId": destination_wallet_id,
                "amount": amount,
            })),
            "Transfer intent received"
        );

        if let Some(existing) = self.find_by_idempotency_key(idempotency_key).await? {
            return Ok(existing);
        }

        let operation = new_operation(
            OperationKind::Transfer,
            idempotency_key,
            Some(issuance_id),
            Some(source_wallet_id),
            Some(destination_wallet_id),
            amount,
            None,
        );
        let steps = vec![
            new_step(&operation.id, 1, StepKind::ReceiverAuthorize, Some(destination_wallet_id), "MPTokenAuthorize"),
            new_step(&operation.id, 2, StepKind::SenderTransfer, Some(source_wallet_id), "Payment"),
        ];

        self.materialize(operation, steps, idempotency_key).await
    }

    /// BURN: the issuer claws the amount back from the holder.
    pub async fn submit_burn(&self, request: BurnRequest) -> Result<IntentOutcome, IntentError> {
        let idempotency_key = require(request.idempotency_key.as_deref(), "idempotencyKey")?;
        let holder_wallet_id = require(request.holder_wallet_id.as_deref(), "holderWalletId")?;
        let issuance_id = require(request.issuance_id.as_deref(), "issuanceId")?;
        let amount = require(request.amount.as_deref(), "amount")?;
        validate_amount(amount)?;

        // Accepted for API compatibility; only the reserved value is legal.
        if let Some(issuer) = request.issuer_wallet_id.as_deref() {
            if issuer != ISSUER_WALLET_ID {
                return Err(IntentError::InvalidArgument(format!(
                    "issuerWalletId must be \"{}\"",
                    ISSUER_WALLET_ID
                )));
            }
        }
        self.require_wallet(holder_wallet_id).await?;

        info!(
            intent = %redaction::guard(&json!({
                "kind": "BURN",
                "idempotencyKey": idempotency_key,
                "holderWalletId": holder_wallet_id,
                "amount": amount,
            })),
            "Burn intent received"
        );

        if let Some(existing) = self.find_by_idempotency_key(idempotency_key).await? {
            return Ok(existing);
        }

        let operation = new_operation(
            OperationKind::Burn,
            idempotency_key,
            Some(issuance_id),
            Some(ISSUER_WALLET_ID),
            Some(holder_wallet_id),
            amount,
            None,
        );
        let steps = vec![new_step(
            &operation.id,
            1,
            StepKind::IssuerClawback,
            Some(ISSUER_WALLET_ID),
            "Clawback",
        )];

        self.materialize(operation, steps, idempotency_key).await
    }

    /// Insert operation and steps atomically, then kick off execution.
    /// A unique violation on the idempotency key means a concurrent
    /// identical intent won the race; the losing insert becomes a read.
    async fn materialize(
        &self,
        operation: operations::Model,
        steps: Vec<operation_steps::Model>,
        idempotency_key: &str,
    ) -> Result<IntentOutcome, IntentError> {
        let insert = async {
            let txn = self.db.begin().await?;
            operation.clone().into_active_model().insert(&txn).await?;
            for step in steps.clone() {
                step.into_active_model().insert(&txn).await?;
            }
            txn.commit().await?;
            Ok::<(), sea_orm::DbErr>(())
        };

        match insert.await {
            Ok(()) => {}
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                info!(
                    idempotency_key = %idempotency_key,
                    "Lost idempotency race; returning the winning operation"
                );
                return self
                    .find_by_idempotency_key(idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        IntentError::InvalidArgument(
                            "idempotency race detected but no winner found".to_string(),
                        )
                    });
            }
            Err(e) => return Err(e.into()),
        }

        self.spawn_executor(&operation.id);

        Ok(IntentOutcome {
            operation,
            steps,
            replayed: false,
        })
    }

    fn spawn_executor(&self, operation_id: &str) {
        let executor = self.executor.clone();
        let operation_id = operation_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = executor.execute(&operation_id).await {
                error!(operation_id = %operation_id, error = %e, "Step executor aborted");
            }
        });
    }

    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<IntentOutcome>, IntentError> {
        let existing = operations::Entity::find()
            .filter(operations::Column::IdempotencyKey.eq(idempotency_key))
            .one(&self.db)
            .await?;

        let Some(operation) = existing else {
            return Ok(None);
        };

        let steps = operation_steps::Entity::find()
            .filter(operation_steps::Column::OperationId.eq(&operation.id))
            .order_by_asc(operation_steps::Column::StepNo)
            .all(&self.db)
            .await?;

        // A replay is also the recovery path for an operation orphaned by a
        // crash: re-invoke the executor unless the outcome is already known.
        // The executor ignores the call when a run is still active.
        let terminal = operation
            .status
            .parse::<OperationStatus>()
            .map(|s| s.is_terminal())
            .unwrap_or(false);
        if !terminal {
            self.spawn_executor(&operation.id);
        }

        Ok(Some(IntentOutcome {
            operation,
            steps,
            replayed: true,
        }))
    }

    async fn require_wallet(&self, wallet_id: &str) -> Result<(), IntentError> {
        if wallet_id == ISSUER_WALLET_ID {
            return Ok(());
        }
        wallets::Entity::find_by_id(wallet_id)
            .one(&self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| IntentError::WalletNotFound(wallet_id.to_string()))
    }
}

fn require<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, IntentError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(IntentError::InvalidArgument(format!(
            "missing required field: {}",
            field
        ))),
    }
}

/// Amounts are arbitrary-precision decimal integers with no scale.
pub(crate) fn validate_amount(raw: &str) -> Result<(), IntentError> {
    let amount = Decimal::from_str(raw)
        .map_err(|_| IntentError::InvalidArgument(format!("amount is not a number: {}", raw)))?;
    if amount <= Decimal::ZERO {
        return Err(IntentError::InvalidArgument(
            "amount must be positive".to_string(),
        ));
    }
    if !amount.fract().is_zero() {
        return Err(IntentError::InvalidArgument(
            "amount must be an integer (no fractional part)".to_string(),
        ));
    }
    Ok(())
}

fn new_operation(
    kind: OperationKind,
    idempotency_key: &str,
    issuance_id: Option<&str>,
    source_wallet_id: Option<&str>,
    destination_wallet_id: Option<&str>,
    amount: &str,
    metadata: Option<&str>,
) -> operations::Model {
    let now = Utc::now().into();
    operations::Model {
        id: Uuid::new_v4().to_string(),
        kind: kind.to_string(),
        idempotency_key: idempotency_key.to_string(),
        issuance_id: issuance_id.map(str::to_string),
        source_wallet_id: source_wallet_id.map(str::to_string),
        destination_wallet_id: destination_wallet_id.map(str::to_string),
        amount: amount.to_string(),
        metadata: metadata.map(str::to_string),
        status: OperationStatus::Pending.to_string(),
        error_code: None,
        error_message: None,
        created_at: now,
        updated_at: now,
    }
}

fn new_step(
    operation_id: &str,
    step_no: i32,
    kind: StepKind,
    signer_wallet_id: Option<&str>,
    tx_type: &str,
) -> operation_steps::Model {
    let now = Utc::now().into();
    operation_steps::Model {
        id: Uuid::new_v4().to_string(),
        operation_id: operation_id.to_string(),
        step_no,
        kind: kind.to_string(),
        signer_wallet_id: signer_wallet_id.map(str::to_string),
        tx_type: tx_type.to_string(),
        tx_hash: None,
        submit_result: None,
        validated_result: None,
        status: StepStatus::Pending.to_string(),
        last_checked_at: None,
        created_at: now,
        updated_at: now,
    }
}
