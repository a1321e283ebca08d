//! StormEvent queries.
//!
//! The absence of an active or previous event is a normal branch for the
//! storm engine, so lookups return `Option` rather than erroring.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, NotSet,
    QueryFilter, QueryOrder, Set,
};

use crate::models::storm_event::{ActiveModel, Column, Entity, Model};

/// The unique open event for (service, kind), if any.
pub async fn active_for_policy<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
    kind: &str,
) -> Result<Option<Model>, DbErr> {
    Entity::find()
        .filter(Column::ServiceId.eq(service_id))
        .filter(Column::Kind.eq(kind))
        .filter(Column::EndedAt.is_null())
        .one(db)
        .await
}

/// The most recently started event for (service, kind), open or closed.
pub async fn last_event<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
    kind: &str,
) -> Result<Option<Model>, DbErr> {
    Entity::find()
        .filter(Column::ServiceId.eq(service_id))
        .filter(Column::Kind.eq(kind))
        .order_by_desc(Column::StartedAt)
        .one(db)
        .await
}

/// All open events for a service, any kind (routing planner).
pub async fn active_for_service<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(Column::ServiceId.eq(service_id))
        .filter(Column::EndedAt.is_null())
        .all(db)
        .await
}

/// Events overlapping [window_start, window_end): started before the
/// window ends and not closed before it starts.
pub async fn overlapping_window<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(Column::ServiceId.eq(service_id))
        .filter(Column::StartedAt.lt(window_end.fixed_offset()))
        .filter(
            Condition::any()
                .add(Column::EndedAt.is_null())
                .add(Column::EndedAt.gt(window_start.fixed_offset())),
        )
        .order_by_asc(Column::StartedAt)
        .all(db)
        .await
}

pub async fn open_event<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
    kind: &str,
    started_at: DateTime<Utc>,
) -> Result<Model, DbErr> {
    ActiveModel {
        id: NotSet,
        service_id: Set(service_id),
        kind: Set(kind.to_string()),
        started_at: Set(started_at.fixed_offset()),
        ended_at: Set(None),
    }
    .insert(db)
    .await
}

pub async fn resolve_event<C: ConnectionTrait>(
    db: &C,
    id: i64,
    ended_at: DateTime<Utc>,
) -> Result<Model, DbErr> {
    ActiveModel {
        id: Set(id),
        ended_at: Set(Some(ended_at.fixed_offset())),
        ..Default::default()
    }
    .update(db)
    .await
}
