//! Atomic status transitions for operations and steps
//!
//! The step executor and the validation poller are the only writers of
//! step state, and both go through these helpers. Transitions are
//! forward-only: a write that would move a step backwards in its
//! lifecycle, or touch a terminal operation, is dropped.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set};
use serde_json::Value;
use tracing::debug;

use crate::entities::{operation_steps, operations};
use crate::models::operation::{OperationStatus, StepStatus};

/// Advance a step to `next`, optionally recording the validated result.
/// Returns the step as stored afterwards; regressions and writes to
/// terminal steps are ignored.
pub async fn advance_step(
    db: &DatabaseConnection,
    step_id: &str,
    next: StepStatus,
    validated_result: Option<Value>,
) -> Result<operation_steps::Model, DbErr> {
    let step = operation_steps::Entity::find_by_id(step_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("operation step {}", step_id)))?;

    let current: StepStatus = step
        .status
        .parse()
        .map_err(|e: String| DbErr::Custom(e))?;

    if current.is_terminal() || next.rank() < current.rank() {
        debug!(
            step_id = %step_id,
            current = %current,
            requested = %next,
            "Dropping non-monotonic step transition"
        );
        return Ok(step);
    }

    let mut active: operation_steps::ActiveModel = step.into();
    active.status = Set(next.to_string());
    if let Some(result) = validated_result {
        active.validated_result = Set(Some(result));
    }
    active.last_checked_at = Set(Some(Utc::now().into()));
    active.updated_at = Set(Utc::now().into());
    active.update(db).await
}

/// Record a successful submission: tx hash, acknowledgement blob, SUBMITTED.
pub async fn mark_step_submitted(
    db: &DatabaseConnection,
    step_id: &str,
    tx_hash: &str,
    acknowledgement: Value,
) -> Result<operation_steps::Model, DbErr> {
    let step = operation_steps::Entity::find_by_id(step_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("operation step {}", step_id)))?;

    let mut active: operation_steps::ActiveModel = step.into();
    active.tx_hash = Set(Some(tx_hash.to_string()));
    active.submit_result = Set(Some(acknowledgement));
    active.status = Set(StepStatus::Submitted.to_string());
    active.updated_at = Set(Utc::now().into());
    active.update(db).await
}

/// Bump last_checked_at after an inconclusive lookup.
pub async fn touch_step_checked(db: &DatabaseConnection, step_id: &str) -> Result<(), DbErr> {
    let step = operation_steps::Entity::find_by_id(step_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("operation step {}", step_id)))?;

    let mut active: operation_steps::ActiveModel = step.into();
    active.last_checked_at = Set(Some(Utc::now().into()));
    active.update(db).await?;
    Ok(())
}

/// Move an operation to IN_PROGRESS unless it is already terminal.
pub async fn set_operation_in_progress(
    db: &DatabaseConnection,
    operation_id: &str,
) -> Result<(), DbErr> {
    set_operation_status(db, operation_id, OperationStatus::InProgress, None, None).await
}

/// Terminal failure with a diagnostic code and message.
pub async fn fail_operation(
    db: &DatabaseConnection,
    operation_id: &str,
    code: &str,
    message: &str,
) -> Result<(), DbErr> {
    set_operation_status(
        db,
        operation_id,
        OperationStatus::Failed,
        Some(code),
        Some(message),
    )
    .await
}

/// Terminal success.
pub async fn complete_operation(db: &DatabaseConnection, operation_id: &str) -> Result<(), DbErr> {
    set_operation_status(db, operation_id, OperationStatus::Success, None, None).await
}

async fn set_operation_status(
    db: &DatabaseConnection,
    operation_id: &str,
    status: OperationStatus,
    error_code: Option<&str>,
    error_message: Option<&str>,
) -> Result<(), DbErr> {
    let operation = operations::Entity::find_by_id(operation_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("operation {}", operation_id)))?;

    let current: OperationStatus = operation
        .status
        .parse()
        .map_err(|e: String| DbErr::Custom(e))?;
    if current.is_terminal() {
        debug!(
            operation_id = %operation_id,
            current = %current,
            requested = %status,
            "Dropping status write to terminal operation"
        );
        return Ok(());
    }

    let mut active: operations::ActiveModel = operation.into();
    active.status = Set(status.to_string());
    if let Some(code) = error_code {
        active.error_code = Set(Some(code.to_string()));
    }
    if let Some(message) = error_message {
        active.error_message = Set(Some(message.to_string()));
    }
    active.updated_at = Set(Utc::now().into());
    active.update(db).await?;
    Ok(())
}

/// Persist the ledger-assigned issuance identifier discovered by a mint's
/// first step. A value already present wins; issuance ids are immutable.
pub async fn persist_issuance_id(
    db: &DatabaseConnection,
    operation_id: &str,
    issuance_id: &str,
) -> Result<(), DbErr> {
    let operation = operations::Entity::find_by_id(operation_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("operation {}", operation_id)))?;

    if operation.issuance_id.is_some() {
        return Ok(());
    }

    let mut active: operations::ActiveModel = operation.into();
    active.issuance_id = Set(Some(issuance_id.to_string()));
    active.updated_at = Set(Utc::now().into());
    active.update(db).await?;
    Ok(())
}
