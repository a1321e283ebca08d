//! Migration to create the usage_snapshots table.
//!
//! Snapshots are keyed by (service_id, window_start, window_end); the
//! unique index makes ingestion idempotent. invoice_id IS NULL marks a
//! snapshot as billable.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UsageSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UsageSnapshots::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UsageSnapshots::ServiceId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsageSnapshots::WindowStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsageSnapshots::WindowEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsageSnapshots::PrimaryBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UsageSnapshots::BackupBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UsageSnapshots::InvoiceId)
                            .big_integer()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usage_snapshots_service_id")
                            .from(UsageSnapshots::Table, UsageSnapshots::ServiceId)
                            .to(Services::Table, Services::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usage_snapshots_invoice_id")
                            .from(UsageSnapshots::Table, UsageSnapshots::InvoiceId)
                            .to(Invoices::Table, Invoices::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_usage_snapshots_window")
                    .table(UsageSnapshots::Table)
                    .col(UsageSnapshots::ServiceId)
                    .col(UsageSnapshots::WindowStart)
                    .col(UsageSnapshots::WindowEnd)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Billing scans only unbilled rows; a partial index keeps that cheap.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_usage_snapshots_unbilled ON usage_snapshots (window_end) WHERE invoice_id IS NULL".to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_usage_snapshots_unbilled").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_usage_snapshots_window").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(UsageSnapshots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UsageSnapshots {
    Table,
    Id,
    ServiceId,
    WindowStart,
    WindowEnd,
    PrimaryBytes,
    BackupBytes,
    InvoiceId,
}

#[derive(DeriveIden)]
enum Services {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Invoices {
    Table,
    Id,
}
