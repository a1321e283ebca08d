//! Migration to create the storm_events table.
//!
//! At most one open event (ended_at IS NULL) may exist per
//! (service_id, kind); a partial unique index enforces it.

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
                    .table(StormEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StormEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StormEvents::ServiceId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StormEvents::Kind).text().not_null())
                    .col(
                        ColumnDef::new(StormEvents::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(StormEvents::EndedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_storm_events_service_id")
                            .from(StormEvents::Table, StormEvents::ServiceId)
                            .to(Services::Table, Services::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Partial unique indexes need raw SQL; the predicate syntax is shared
        // between Postgres and SQLite.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_storm_events_one_open ON storm_events (service_id, kind) WHERE ended_at IS NULL".to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_storm_events_service_kind_started")
                    .table(StormEvents::Table)
                    .col(StormEvents::ServiceId)
                    .col(StormEvents::Kind)
                    .col(StormEvents::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_storm_events_service_kind_started")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_storm_events_one_open").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(StormEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StormEvents {
    Table,
    Id,
    ServiceId,
    Kind,
    StartedAt,
    EndedAt,
}

#[derive(DeriveIden)]
enum Services {
    Table,
    Id,
}
