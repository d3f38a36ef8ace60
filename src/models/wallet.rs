//! Wallet request/response types

use serde::{Deserialize, Serialize};

/// Request body for POST /api/wallets
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletRequest {
    /// Optional caller-supplied seed; generated when absent.
    pub seed: Option<String>,
}

/// Wallet representation in API responses
///
/// The issuer is served as a virtual wallet: `wallet_id` is the reserved
/// literal "issuer" and no timestamps exist because nothing is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub wallet_id: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<crate::entities::wallets::Model> for WalletResponse {
    fn from(model: crate::entities::wallets::Model) -> Self {
        Self {
            wallet_id: model.id,
            address: model.address,
            created_at: Some(model.created_at.to_rfc3339()),
            updated_at: Some(model.updated_at.to_rfc3339()),
        }
    }
}

/// Response body for GET /api/wallets/{id}/balance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub wallet_id: String,
    pub address: String,
    /// None when the ledger reports the account as not found (unfunded).
    pub balance: Option<String>,
}
