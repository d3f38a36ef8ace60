// src/lib.rs

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;

use services::credential_store::CredentialStore;
use services::intents::IntentService;
use services::ledger::LedgerClient;
use services::signer_locks::SignerLocks;

pub mod config;
pub mod entities;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod services;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub ledger: Arc<dyn LedgerClient>,
    pub credentials: Arc<CredentialStore>,
    pub signer_locks: Arc<SignerLocks>,
    pub intents: Arc<IntentService>,
}

/// Build the full API router over the given state. CORS is layered on in
/// main so tests can drive the bare router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/operations/mint", post(handlers::operations::submit_mint))
        .route("/api/operations/transfer", post(handlers::operations::submit_transfer))
        .route("/api/operations/burn", post(handlers::operations::submit_burn))
        .route("/api/operations", get(handlers::operations::list_operations))
        .route("/api/operations/{id}", get(handlers::operations::get_operation))
        .route("/api/wallets", post(handlers::wallets::create_wallet))
        .route("/api/wallets/{id}", get(handlers::wallets::get_wallet))
        .route("/api/wallets/{id}/fund", post(handlers::wallets::fund_wallet))
        .route("/api/wallets/{id}/balance", get(handlers::wallets::get_balance))
        .with_state(state)
}
