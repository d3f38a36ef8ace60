//! Migration to create the operations table for mint/transfer/burn intents
//!
//! The unique constraint on idempotency_key is the idempotency index: a
//! losing concurrent insert surfaces as a unique violation and is resolved
//! by re-reading the winner. Wallet id columns are plain strings because
//! they may carry the reserved literal "issuer" for which no row exists.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Operations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Operations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Operations::Kind)
                            .string()
                            .not_null()
                            .check(
                                Expr::col(Operations::Kind)
                                    .is_in(["MINT", "TRANSFER", "BURN"]),
                            ),
                    )
                    .col(
                        ColumnDef::new(Operations::IdempotencyKey)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    // Null for MINT until step 1 validates and the ledger
                    // assigns the issuance identifier.
                    .col(ColumnDef::new(Operations::IssuanceId).string().null())
                    .col(ColumnDef::new(Operations::SourceWalletId).string().null())
                    .col(
                        ColumnDef::new(Operations::DestinationWalletId)
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(Operations::Amount).string().not_null())
                    .col(ColumnDef::new(Operations::Metadata).string().null())
                    .col(
                        ColumnDef::new(Operations::Status)
                            .string()
                            .not_null()
                            .default("PENDING")
                            .check(Expr::col(Operations::Status).is_in([
                                "PENDING",
                                "IN_PROGRESS",
                                "SUCCESS",
                                "FAILED",
                            ])),
                    )
                    .col(ColumnDef::new(Operations::ErrorCode).string().null())
                    .col(ColumnDef::new(Operations::ErrorMessage).string().null())
                    .col(
                        ColumnDef::new(Operations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Operations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for querying operations that reference a wallet
        manager
            .create_index(
                Index::create()
                    .name("idx_operations_destination_wallet")
                    .table(Operations::Table)
                    .col(Operations::DestinationWalletId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_operations_status")
                    .table(Operations::Table)
                    .col(Operations::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Operations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Operations {
    Table,
    Id,
    Kind,
    IdempotencyKey,
    IssuanceId,
    SourceWalletId,
    DestinationWalletId,
    Amount,
    Metadata,
    Status,
    ErrorCode,
    ErrorMessage,
    CreatedAt,
    UpdatedAt,
}
