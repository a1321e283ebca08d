//! ProbeSample queries: append-only inserts plus the windowed
//! availability aggregate backing the SQL metrics store.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, NotSet, QueryFilter,
    QuerySelect, Set,
};

use crate::models::probe_sample::{ActiveModel, Column, Entity, Model};

pub async fn insert_sample<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
    metrics_key: &str,
    probed_at: DateTime<Utc>,
    ok: bool,
    latency_ms: Option<i32>,
) -> Result<Model, DbErr> {
    ActiveModel {
        id: NotSet,
        service_id: Set(service_id),
        metrics_key: Set(metrics_key.to_string()),
        probed_at: Set(probed_at.fixed_offset()),
        ok: Set(ok),
        latency_ms: Set(latency_ms),
    }
    .insert(db)
    .await
}

/// Pooled ok-ratio over every sample newer than `cutoff`; None when the
/// window holds no samples. Targets without samples simply contribute
/// nothing, which matches the pooled okCount/totalCount definition.
pub async fn availability<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
    cutoff: DateTime<Utc>,
) -> Result<Option<f64>, DbErr> {
    let value: Option<Option<f64>> = Entity::find()
        .select_only()
        .column_as(
            Expr::cust("AVG(CASE WHEN ok THEN 1.0 ELSE 0.0 END)"),
            "value",
        )
        .filter(Column::ServiceId.eq(service_id))
        .filter(Column::ProbedAt.gt(cutoff.fixed_offset()))
        .into_tuple()
        .one(db)
        .await?;
    Ok(value.flatten())
}
