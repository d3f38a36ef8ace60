//! Validation poller job
//!
//! Background sweep that rescues in-flight submissions whose inline
//! validation window expired, and reconciles SUBMITTED rows orphaned by a
//! crash between submit and the start of the wait. Each pass re-queries
//! the ledger for a small batch of steps ordered by least-recently-checked
//! (never-checked rows first), promotes validated ones to their terminal
//! status and propagates completion to the enclosing operation. There is
//! no retry limit: a row is rechecked at the sweep interval until the
//! ledger answers.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::sea_query::NullOrdering;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, Order, QueryFilter, QueryOrder, QuerySelect,
};
use tracing::{info, warn};

use crate::entities::operation_steps;
use crate::models::operation::{OperationStatus, StepKind, StepStatus};
use crate::services::ledger::{self, LedgerClient, LookupOutcome};
use crate::services::step_executor::extract_issuance_id;
use crate::services::transitions;

/// Default interval between sweeps
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Steps examined per sweep
const SWEEP_BATCH_SIZE: u64 = 10;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub sweep_interval: Duration,
    pub batch_size: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            batch_size: SWEEP_BATCH_SIZE,
        }
    }
}

pub struct ValidationPoller {
    db: DatabaseConnection,
    ledger: Arc<dyn LedgerClient>,
    config: PollerConfig,
}

impl ValidationPoller {
    pub fn new(
        db: DatabaseConnection,
        ledger: Arc<dyn LedgerClient>,
        config: PollerConfig,
    ) -> Self {
        Self { db, ledger, config }
    }

    pub fn sweep_interval(&self) -> Duration {
        self.config.sweep_interval
    }

    /// One pass over the in-flight steps. Transient failures on one row are
    /// logged and do not stop the rest of the batch. Returns the number of
    /// steps examined.
    pub async fn sweep_once(&self) -> usize {
        let batch = match operation_steps::Entity::find()
            .filter(operation_steps::Column::Status.is_in([
                StepStatus::Submitted.to_string(),
                StepStatus::PendingValidation.to_string(),
            ]))
            .filter(operation_steps::Column::TxHash.is_not_null())
            .order_by_with_nulls(
                operation_steps::Column::LastCheckedAt,
                Order::Asc,
                NullOrdering::First,
            )
            .limit(self.config.batch_size)
            .all(&self.db)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Validation poller: sweep query failed");
                return 0;
            }
        };

        let examined = batch.len();
        for step in batch {
            if let Err(e) = self.reconcile(&step).await {
                warn!(
                    step_id = %step.id,
                    error = %e,
                    "Validation poller: failed to reconcile step"
                );
            }
        }
        examined
    }

    async fn reconcile(&self, step: &operation_steps::Model) -> Result<(), sea_orm::DbErr> {
        let Some(tx_hash) = step.tx_hash.as_deref() else {
            return Ok(());
        };

        match self.ledger.lookup(tx_hash).await {
            Ok(LookupOutcome::Validated { result, metadata }) => {
                if ledger::is_validated_success(&result) {
                    transitions::advance_step(
                        &self.db,
                        &step.id,
                        StepStatus::ValidatedSuccess,
                        Some(metadata.clone()),
                    )
                    .await?;

                    if step.kind.parse::<StepKind>() == Ok(StepKind::IssuerMint) {
                        if let Some(issuance_id) = extract_issuance_id(&metadata) {
                            transitions::persist_issuance_id(
                                &self.db,
                                &step.operation_id,
                                &issuance_id,
                            )
                            .await?;
                        }
                    }

                    info!(
                        step_id = %step.id,
                        tx_hash = %tx_hash,
                        "Validation poller: step validated"
                    );
                    self.maybe_complete_operation(&step.operation_id).await?;
                } else {
                    transitions::advance_step(
                        &self.db,
                        &step.id,
                        StepStatus::ValidatedFailed,
                        Some(metadata),
                    )
                    .await?;
                    transitions::fail_operation(
                        &self.db,
                        &step.operation_id,
                        "STEP_FAILED",
                        &format!(
                            "step {} failed: transaction result {}",
                            step.step_no, result
                        ),
                    )
                    .await?;
                    info!(
                        step_id = %step.id,
                        result = %result,
                        "Validation poller: step terminally failed"
                    );
                }
            }
            Ok(LookupOutcome::NotFound) | Ok(LookupOutcome::Pending) => {
                transitions::touch_step_checked(&self.db, &step.id).await?;
            }
            Err(e) => {
                // Transient; the row keeps its position at the front of the
                // next sweep.
                warn!(tx_hash = %tx_hash, error = %e, "Validation poller: lookup failed");
            }
        }
        Ok(())
    }

    /// Promote the parent operation to SUCCESS when every step validated.
    async fn maybe_complete_operation(&self, operation_id: &str) -> Result<(), sea_orm::DbErr> {
        let steps = operation_steps::Entity::find()
            .filter(operation_steps::Column::OperationId.eq(operation_id))
            .all(&self.db)
            .await?;

        let statuses: Vec<StepStatus> = steps
            .iter()
            .filter_map(|s| s.status.parse().ok())
            .collect();

        if statuses.len() == steps.len()
            && OperationStatus::from_step_statuses(&statuses) == Some(OperationStatus::Success)
        {
            transitions::complete_operation(&self.db, operation_id).await?;
            info!(operation_id = %operation_id, "Validation poller: operation completed");
        }
        Ok(())
    }
}

/// Start the poller loop. Single instance per process, started at boot;
/// a shutdown signal interrupts the sleep and exits at the next iteration
/// boundary.
pub async fn start_validation_poller_job(poller: Arc<ValidationPoller>) {
    tokio::spawn(async move {
        info!(
            interval_secs = poller.sweep_interval().as_secs(),
            "Validation poller started"
        );

        let mut interval = tokio::time::interval(poller.sweep_interval());
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping validation poller");
                    break;
                }
                _ = interval.tick() => {
                    let examined = poller.sweep_once().await;
                    if examined > 0 {
                        info!(examined = examined, "Validation poller sweep finished");
                    }
                }
            }
        }

        info!("Validation poller stopped");
    });
}
