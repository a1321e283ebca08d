//! Migration to create the storm_policies table.
//!
//! A policy carries the availability threshold, evaluation window,
//! re-open cooldown, and the billing coverage cap for one storm kind.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StormPolicies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StormPolicies::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StormPolicies::ServiceId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StormPolicies::Kind).text().not_null())
                    .col(
                        ColumnDef::new(StormPolicies::ThresholdAvail)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StormPolicies::WindowSeconds)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StormPolicies::CooldownSeconds)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StormPolicies::MaxCoverageFactor)
                            .double()
                            .not_null()
                            .default(1.0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_storm_policies_service_id")
                            .from(StormPolicies::Table, StormPolicies::ServiceId)
                            .to(Services::Table, Services::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_storm_policies_service")
                    .table(StormPolicies::Table)
                    .col(StormPolicies::ServiceId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_storm_policies_service").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(StormPolicies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StormPolicies {
    Table,
    Id,
    ServiceId,
    Kind,
    ThresholdAvail,
    WindowSeconds,
    CooldownSeconds,
    MaxCoverageFactor,
}

#[derive(DeriveIden)]
enum Services {
    Table,
    Id,
}
