//! `SeaORM` Entity for the operations table
//!
//! One row per user-visible intent (mint, transfer, burn). Wallet id
//! columns are strings, not foreign keys: they may carry the reserved
//! literal "issuer" for which no wallets row exists.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "operations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kind: String,
    #[sea_orm(unique)]
    pub idempotency_key: String,
    /// Null for MINT until step 1 validates and the ledger assigns one.
    pub issuance_id: Option<String>,
    pub source_wallet_id: Option<String>,
    pub destination_wallet_id: Option<String>,
    pub amount: String,
    /// Optional issuance metadata supplied with a mint intent.
    pub metadata: Option<String>,
    pub status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::operation_steps::Entity")]
    OperationSteps,
}

impl Related<super::operation_steps::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OperationSteps.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
