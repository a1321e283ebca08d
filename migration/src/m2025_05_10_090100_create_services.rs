//! Migration to create the services table.
//!
//! A service is a logical application owned by a customer with a primary
//! and backup CDN. Deletion is soft via deleted_at.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Services::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Services::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Services::CustomerId).big_integer().not_null())
                    .col(ColumnDef::new(Services::Name).text().not_null())
                    .col(ColumnDef::new(Services::PrimaryCdn).text().not_null())
                    .col(ColumnDef::new(Services::BackupCdn).text().not_null())
                    .col(
                        ColumnDef::new(Services::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Services::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_services_customer_id")
                            .from(Services::Table, Services::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Listing and mutation always filter by (customer_id, deleted_at IS NULL).
        manager
            .create_index(
                Index::create()
                    .name("idx_services_customer_deleted")
                    .table(Services::Table)
                    .col(Services::CustomerId)
                    .col(Services::DeletedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_services_customer_deleted").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Services::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Services {
    Table,
    Id,
    CustomerId,
    Name,
    PrimaryCdn,
    BackupCdn,
    CreatedAt,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
}
