//! StormPolicy queries.

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, NotSet, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::models::storm_policy::{ActiveModel, Column, Entity, Model};

pub async fn policies_for_service<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(Column::ServiceId.eq(service_id))
        .order_by_asc(Column::Id)
        .all(db)
        .await
}

pub async fn policy_for_service<C: ConnectionTrait>(
    db: &C,
    id: i64,
    service_id: i64,
) -> Result<Option<Model>, DbErr> {
    Entity::find()
        .filter(Column::Id.eq(id))
        .filter(Column::ServiceId.eq(service_id))
        .one(db)
        .await
}

pub async fn insert_policy<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
    kind: &str,
    threshold_avail: f64,
    window_seconds: i32,
    cooldown_seconds: i32,
    max_coverage_factor: f64,
) -> Result<Model, DbErr> {
    ActiveModel {
        id: NotSet,
        service_id: Set(service_id),
        kind: Set(kind.to_string()),
        threshold_avail: Set(threshold_avail),
        window_seconds: Set(window_seconds),
        cooldown_seconds: Set(cooldown_seconds),
        max_coverage_factor: Set(max_coverage_factor),
    }
    .insert(db)
    .await
}

pub async fn update_policy<C: ConnectionTrait>(db: &C, policy: Model) -> Result<Model, DbErr> {
    ActiveModel {
        id: Set(policy.id),
        service_id: Set(policy.service_id),
        kind: Set(policy.kind),
        threshold_avail: Set(policy.threshold_avail),
        window_seconds: Set(policy.window_seconds),
        cooldown_seconds: Set(policy.cooldown_seconds),
        max_coverage_factor: Set(policy.max_coverage_factor),
    }
    .update(db)
    .await
}

/// Returns the number of rows removed (0 means not found).
pub async fn delete_policy<C: ConnectionTrait>(
    db: &C,
    id: i64,
    service_id: i64,
) -> Result<u64, DbErr> {
    let result = Entity::delete_many()
        .filter(Column::Id.eq(id))
        .filter(Column::ServiceId.eq(service_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Largest coverage cap across the service's policies; None when the
/// service has no policies.
pub async fn max_coverage_factor_for_service<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
) -> Result<Option<f64>, DbErr> {
    let value: Option<Option<f64>> = Entity::find()
        .select_only()
        .column_as(Expr::col(Column::MaxCoverageFactor).max(), "value")
        .filter(Column::ServiceId.eq(service_id))
        .into_tuple()
        .one(db)
        .await?;
    Ok(value.flatten())
}
