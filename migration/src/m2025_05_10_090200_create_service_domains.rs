//! Migration to create the service_domains table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ServiceDomains::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ServiceDomains::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ServiceDomains::ServiceId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ServiceDomains::Name).text().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_service_domains_service_id")
                            .from(ServiceDomains::Table, ServiceDomains::ServiceId)
                            .to(Services::Table, Services::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_service_domains_service_name")
                    .table(ServiceDomains::Table)
                    .col(ServiceDomains::ServiceId)
                    .col(ServiceDomains::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_service_domains_service_name")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ServiceDomains::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ServiceDomains {
    Table,
    Id,
    ServiceId,
    Name,
}

#[derive(DeriveIden)]
enum Services {
    Table,
    Id,
}
