//! Wallet custody handlers
//!
//! Creation generates (or accepts) a seed, encrypts it at rest, and stores
//! only the ciphertext; the seed never appears in any response. The id
//! "issuer" is served as a virtual wallet derived from process
//! configuration.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rand::RngCore;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::entities::wallets;
use crate::handlers::error::ApiError;
use crate::models::wallet::{BalanceResponse, CreateWalletRequest, WalletResponse};
use crate::models::ISSUER_WALLET_ID;
use crate::AppState;

/// Entropy bytes behind a generated seed
const SEED_ENTROPY_LEN: usize = 16;

fn generate_seed() -> String {
    let mut entropy = [0u8; SEED_ENTROPY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    format!("s{}", hex::encode(entropy))
}

/// POST /api/wallets
pub async fn create_wallet(
    State(state): State<AppState>,
    request: Option<Json<CreateWalletRequest>>,
) -> Result<(StatusCode, Json<WalletResponse>), ApiError> {
    let seed = request
        .and_then(|Json(r)| r.seed)
        .unwrap_or_else(generate_seed);

    let address = state.ledger.derive_address(&seed)?;
    let sealed = state.credentials.seal(&seed);

    let now = Utc::now().into();
    let wallet = wallets::Model {
        id: Uuid::new_v4().to_string(),
        address,
        seed_cipher: sealed.cipher_hex,
        seed_nonce: sealed.nonce_hex,
        seed_tag: sealed.tag_hex,
        created_at: now,
        updated_at: now,
    };
    let wallet = wallet.into_active_model().insert(&state.db).await?;

    info!(wallet_id = %wallet.id, address = %wallet.address, "Wallet created");
    Ok((StatusCode::CREATED, Json(wallet.into())))
}

/// GET /api/wallets/{id}
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<Json<WalletResponse>, ApiError> {
    if wallet_id == ISSUER_WALLET_ID {
        let seed = state.credentials.fetch_seed(ISSUER_WALLET_ID).await?;
        let address = state.ledger.derive_address(&seed)?;
        return Ok(Json(WalletResponse {
            wallet_id: ISSUER_WALLET_ID.to_string(),
            address,
            created_at: None,
            updated_at: None,
        }));
    }

    let wallet = wallets::Entity::find_by_id(&wallet_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Wallet not found: {}", wallet_id)))?;

    Ok(Json(wallet.into()))
}

/// POST /api/wallets/{id}/fund
///
/// Test networks only; funding the issuer through the faucet is rejected.
pub async fn fund_wallet(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if wallet_id == ISSUER_WALLET_ID {
        return Err(ApiError::bad_request(
            "the issuer wallet cannot be faucet-funded",
        ));
    }

    let wallet = wallets::Entity::find_by_id(&wallet_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Wallet not found: {}", wallet_id)))?;

    state.ledger.fund(&wallet.address).await?;
    info!(wallet_id = %wallet_id, address = %wallet.address, "Wallet funded from faucet");

    Ok(Json(json!({
        "walletId": wallet_id,
        "address": wallet.address,
        "funded": true,
    })))
}

/// GET /api/wallets/{id}/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let address = if wallet_id == ISSUER_WALLET_ID {
        let seed = state.credentials.fetch_seed(ISSUER_WALLET_ID).await?;
        state.ledger.derive_address(&seed)?
    } else {
        wallets::Entity::find_by_id(&wallet_id)
            .one(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Wallet not found: {}", wallet_id)))?
            .address
    };

    let balance = state.ledger.balance(&address).await?;

    Ok(Json(BalanceResponse {
        wallet_id,
        address,
        balance: balance.map(|b| b.to_string()),
    }))
}
