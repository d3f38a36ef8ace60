//! Operation intent and status handlers
//!
//! POST handlers accept validated intents and return 201 with the new
//! operation (200 on idempotent replay). GET returns full status including
//! steps, or the lightweight operation-only form with `?status=true`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;

use crate::entities::{operation_steps, operations};
use crate::handlers::error::ApiError;
use crate::models::operation::{BurnRequest, MintRequest, OperationResponse, TransferRequest};
use crate::services::intents::IntentOutcome;
use crate::AppState;

fn intent_response(outcome: IntentOutcome) -> (StatusCode, Json<OperationResponse>) {
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    (
        status,
        Json(OperationResponse::with_steps(
            outcome.operation,
            outcome.steps,
        )),
    )
}

/// POST /api/operations/mint
pub async fn submit_mint(
    State(state): State<AppState>,
    Json(request): Json<MintRequest>,
) -> Result<(StatusCode, Json<OperationResponse>), ApiError> {
    let outcome = state.intents.submit_mint(request).await?;
    Ok(intent_response(outcome))
}

/// POST /api/operations/transfer
pub async fn submit_transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<OperationResponse>), ApiError> {
    let outcome = state.intents.submit_transfer(request).await?;
    Ok(intent_response(outcome))
}

/// POST /api/operations/burn
pub async fn submit_burn(
    State(state): State<AppState>,
    Json(request): Json<BurnRequest>,
) -> Result<(StatusCode, Json<OperationResponse>), ApiError> {
    let outcome = state.intents.submit_burn(request).await?;
    Ok(intent_response(outcome))
}

/// Query parameters for GET /api/operations/{id}
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// `?status=true` returns the operation without its steps.
    #[serde(default)]
    pub status: bool,
}

/// GET /api/operations/{id}
pub async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<OperationResponse>, ApiError> {
    let operation = operations::Entity::find_by_id(&operation_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Operation not found: {}", operation_id)))?;

    if query.status {
        return Ok(Json(OperationResponse::from_model(operation)));
    }

    let steps = operation_steps::Entity::find()
        .filter(operation_steps::Column::OperationId.eq(&operation_id))
        .order_by_asc(operation_steps::Column::StepNo)
        .all(&state.db)
        .await?;

    Ok(Json(OperationResponse::with_steps(operation, steps)))
}

/// Query parameters for GET /api/operations
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Wallet id appearing as source or destination.
    pub wallet: String,
}

/// GET /api/operations?wallet={id}
pub async fn list_operations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<OperationResponse>>, ApiError> {
    let operations = operations::Entity::find()
        .filter(
            Condition::any()
                .add(operations::Column::SourceWalletId.eq(&query.wallet))
                .add(operations::Column::DestinationWalletId.eq(&query.wallet)),
        )
        .order_by_desc(operations::Column::CreatedAt)
        .all(&state.db)
        .await?;

    Ok(Json(
        operations
            .into_iter()
            .map(OperationResponse::from_model)
            .collect(),
    ))
}
