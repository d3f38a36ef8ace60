//! Unified API error type
//!
//! Handlers never expose internal error structures; everything surfaces as
//! `{error, details?}` JSON with an appropriate status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::services::credential_store::CredentialError;
use crate::services::intents::IntentError;
use crate::services::ledger::LedgerError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            details: self.details,
        });
        (self.status, body).into_response()
    }
}

impl From<IntentError> for ApiError {
    fn from(e: IntentError) -> Self {
        match e {
            IntentError::InvalidArgument(message) => ApiError::bad_request(message),
            IntentError::WalletNotFound(wallet_id) => {
                ApiError::not_found(format!("Wallet not found: {}", wallet_id))
            }
            IntentError::Db(e) => ApiError::internal(format!("Database error: {}", e)),
        }
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(e: sea_orm::DbErr) -> Self {
        ApiError::internal(format!("Database error: {}", e))
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::FaucetUnavailable(message) => ApiError::bad_request(message),
            LedgerError::InvalidSeed(message) => ApiError::bad_request(message),
            other => ApiError::internal(format!("Ledger error: {}", other)),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::NotFound(wallet_id) => {
                ApiError::not_found(format!("Wallet not found: {}", wallet_id))
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}
