//! `SeaORM` Entity for the wallets table
//!
//! Custody record for one user identity. Seed material is stored encrypted;
//! the plaintext only exists inside the credential store. The reserved
//! identifier "issuer" never appears in this table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub address: String,
    pub seed_cipher: String,
    pub seed_nonce: String,
    pub seed_tag: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
