//! `SeaORM` Entity for the operation_steps table
//!
//! One row per ledger transaction within an operation, numbered 1..3.
//! Submit acknowledgement and validated result are kept verbatim for audit.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "operation_steps")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub operation_id: String,
    pub step_no: i32,
    pub kind: String,
    /// None means the step is performed by the issuer identity.
    pub signer_wallet_id: Option<String>,
    pub tx_type: String,
    pub tx_hash: Option<String>,
    pub submit_result: Option<Json>,
    pub validated_result: Option<Json>,
    pub status: String,
    pub last_checked_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::operations::Entity",
        from = "Column::OperationId",
        to = "super::operations::Column::Id",
        on_delete = "Cascade"
    )]
    Operations,
}

impl Related<super::operations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Operations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
