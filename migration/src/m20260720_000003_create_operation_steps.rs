//! Migration to create the operation_steps table
//!
//! One row per ledger transaction within an operation. The partial index
//! covers exactly the poller sweep predicate: steps that were submitted but
//! have not reached a terminal status, including SUBMITTED rows orphaned by
//! a crash between submit and the start of the validation wait.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OperationSteps::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OperationSteps::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OperationSteps::OperationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OperationSteps::StepNo)
                            .integer()
                            .not_null()
                            .check(
                                Expr::col(OperationSteps::StepNo)
                                    .gte(1)
                                    .and(Expr::col(OperationSteps::StepNo).lte(3)),
                            ),
                    )
                    .col(ColumnDef::new(OperationSteps::Kind).string().not_null())
                    .col(
                        ColumnDef::new(OperationSteps::SignerWalletId)
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(OperationSteps::TxType).string().not_null())
                    .col(ColumnDef::new(OperationSteps::TxHash).string().null())
                    .col(ColumnDef::new(OperationSteps::SubmitResult).json().null())
                    .col(
                        ColumnDef::new(OperationSteps::ValidatedResult)
                            .json()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OperationSteps::Status)
                            .string()
                            .not_null()
                            .default("PENDING")
                            .check(Expr::col(OperationSteps::Status).is_in([
                                "PENDING",
                                "SUBMITTED",
                                "PENDING_VALIDATION",
                                "VALIDATED_SUCCESS",
                                "VALIDATED_FAILED",
                                "TIMEOUT",
                            ])),
                    )
                    .col(
                        ColumnDef::new(OperationSteps::LastCheckedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OperationSteps::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(OperationSteps::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_operation_steps_operation")
                            .from(OperationSteps::Table, OperationSteps::OperationId)
                            .to(Operations::Table, Operations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_operation_steps_operation_step_no")
                    .table(OperationSteps::Table)
                    .col(OperationSteps::OperationId)
                    .col(OperationSteps::StepNo)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Partial index for the validation poller sweep. sea-query's index
        // builder has no WHERE clause, so this is raw SQL; the statement is
        // valid on both Postgres and SQLite.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX idx_operation_steps_sweep \
                 ON operation_steps (status, last_checked_at) \
                 WHERE status IN ('SUBMITTED', 'PENDING_VALIDATION') \
                 AND tx_hash IS NOT NULL",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OperationSteps::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OperationSteps {
    Table,
    Id,
    OperationId,
    StepNo,
    Kind,
    SignerWalletId,
    TxType,
    TxHash,
    SubmitResult,
    ValidatedResult,
    Status,
    LastCheckedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Operations {
    Table,
    Id,
}
