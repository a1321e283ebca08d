//! UsageSnapshot queries: idempotent ingestion upserts and the locked
//! scan the billing engine claims work from.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockBehavior, LockType, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DbErr, EntityTrait, FromQueryResult, JoinType,
    NotSet, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};

use crate::models::service;
use crate::models::usage_snapshot::{ActiveModel, Column, Entity, Relation};

/// An unbilled snapshot joined with its owning customer.
#[derive(Debug, Clone, FromQueryResult)]
pub struct BillableSnapshot {
    pub id: i64,
    pub service_id: i64,
    pub customer_id: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub primary_bytes: i64,
    pub backup_bytes: i64,
}

/// Inserts or refreshes the snapshot keyed by (service_id, window_start,
/// window_end); the unique index makes re-ingestion idempotent.
pub async fn upsert_snapshot<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    primary_bytes: i64,
    backup_bytes: i64,
) -> Result<(), DbErr> {
    let model = ActiveModel {
        id: NotSet,
        service_id: Set(service_id),
        window_start: Set(window_start.fixed_offset()),
        window_end: Set(window_end.fixed_offset()),
        primary_bytes: Set(primary_bytes),
        backup_bytes: Set(backup_bytes),
        invoice_id: NotSet,
    };

    Entity::insert(model)
        .on_conflict(
            OnConflict::columns([Column::ServiceId, Column::WindowStart, Column::WindowEnd])
                .update_columns([Column::PrimaryBytes, Column::BackupBytes])
                .to_owned(),
        )
        .exec(db)
        .await?;
    Ok(())
}

/// Snapshots with invoice_id IS NULL whose window_end falls inside
/// (window_start, window_end], in arrival order. On Postgres the rows are
/// claimed with FOR UPDATE SKIP LOCKED so concurrent billing workers pick
/// disjoint sets; SQLite has no row locks and runs the bare query.
pub async fn lock_unbilled<C: ConnectionTrait>(
    db: &C,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<BillableSnapshot>, DbErr> {
    let mut query = Entity::find()
        .select_only()
        .columns([
            Column::Id,
            Column::ServiceId,
            Column::WindowStart,
            Column::WindowEnd,
            Column::PrimaryBytes,
            Column::BackupBytes,
        ])
        .column_as(service::Column::CustomerId, "customer_id")
        .join(JoinType::InnerJoin, Relation::Service.def())
        .filter(Column::InvoiceId.is_null())
        .filter(Column::WindowEnd.gt(window_start.fixed_offset()))
        .filter(Column::WindowEnd.lte(window_end.fixed_offset()))
        .order_by_asc(Column::Id);

    if db.get_database_backend() == DatabaseBackend::Postgres {
        query = query.lock_with_behavior(LockType::Update, LockBehavior::SkipLocked);
    }

    query.into_model::<BillableSnapshot>().all(db).await
}

/// Stamps the snapshot with its invoice, closing the exactly-once loop.
pub async fn mark_invoiced<C: ConnectionTrait>(
    db: &C,
    snapshot_id: i64,
    invoice_id: i64,
) -> Result<(), DbErr> {
    Entity::update_many()
        .col_expr(Column::InvoiceId, Expr::value(invoice_id))
        .filter(Column::Id.eq(snapshot_id))
        .exec(db)
        .await?;
    Ok(())
}
