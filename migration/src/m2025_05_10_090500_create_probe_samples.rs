//! Migration to create the append-only probe_samples table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProbeSamples::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProbeSamples::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProbeSamples::ServiceId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProbeSamples::MetricsKey).text().not_null())
                    .col(
                        ColumnDef::new(ProbeSamples::ProbedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(ProbeSamples::Ok).boolean().not_null())
                    .col(ColumnDef::new(ProbeSamples::LatencyMs).integer().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_probe_samples_service_id")
                            .from(ProbeSamples::Table, ProbeSamples::ServiceId)
                            .to(Services::Table, Services::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Windowed availability scans filter by service and probe time.
        manager
            .create_index(
                Index::create()
                    .name("idx_probe_samples_service_probed")
                    .table(ProbeSamples::Table)
                    .col(ProbeSamples::ServiceId)
                    .col(ProbeSamples::ProbedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_probe_samples_service_probed")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ProbeSamples::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProbeSamples {
    Table,
    Id,
    ServiceId,
    MetricsKey,
    ProbedAt,
    Ok,
    LatencyMs,
}

#[derive(DeriveIden)]
enum Services {
    Table,
    Id,
}
