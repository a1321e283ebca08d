//! Service queries. Reads exclude soft-deleted rows; customer-facing
//! paths additionally scope by customer_id.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};

use crate::models::service::{ActiveModel, Column, Entity, Model};

/// All non-deleted services across customers (worker loops).
pub async fn active_services<C: ConnectionTrait>(db: &C) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(Column::DeletedAt.is_null())
        .order_by_asc(Column::Id)
        .all(db)
        .await
}

/// Non-deleted services owned by one customer.
pub async fn active_services_for_customer<C: ConnectionTrait>(
    db: &C,
    customer_id: i64,
) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(Column::CustomerId.eq(customer_id))
        .filter(Column::DeletedAt.is_null())
        .order_by_asc(Column::Id)
        .all(db)
        .await
}

/// One non-deleted service scoped to its owner.
pub async fn service_for_customer<C: ConnectionTrait>(
    db: &C,
    id: i64,
    customer_id: i64,
) -> Result<Option<Model>, DbErr> {
    Entity::find()
        .filter(Column::Id.eq(id))
        .filter(Column::CustomerId.eq(customer_id))
        .filter(Column::DeletedAt.is_null())
        .one(db)
        .await
}

pub async fn insert_service<C: ConnectionTrait>(
    db: &C,
    customer_id: i64,
    name: &str,
    primary_cdn: &str,
    backup_cdn: &str,
) -> Result<Model, DbErr> {
    ActiveModel {
        id: NotSet,
        customer_id: Set(customer_id),
        name: Set(name.to_string()),
        primary_cdn: Set(primary_cdn.to_string()),
        backup_cdn: Set(backup_cdn.to_string()),
        created_at: Set(Utc::now().fixed_offset()),
        deleted_at: Set(None),
    }
    .insert(db)
    .await
}

pub async fn update_service<C: ConnectionTrait>(
    db: &C,
    id: i64,
    name: &str,
    primary_cdn: &str,
    backup_cdn: &str,
) -> Result<Model, DbErr> {
    ActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
        primary_cdn: Set(primary_cdn.to_string()),
        backup_cdn: Set(backup_cdn.to_string()),
        ..Default::default()
    }
    .update(db)
    .await
}

/// Marks a service deleted. Returns None when the service does not exist
/// (or belongs to someone else), matching the 404 contract.
pub async fn soft_delete_service<C: ConnectionTrait>(
    db: &C,
    id: i64,
    customer_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<Model>, DbErr> {
    let Some(existing) = service_for_customer(db, id, customer_id).await? else {
        return Ok(None);
    };

    let deleted = ActiveModel {
        id: Set(existing.id),
        deleted_at: Set(Some(now.fixed_offset())),
        ..Default::default()
    }
    .update(db)
    .await?;

    Ok(Some(deleted))
}
