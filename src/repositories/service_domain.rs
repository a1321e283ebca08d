//! ServiceDomain queries.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};

use crate::models::service_domain::{ActiveModel, Column, Entity, Model};

pub async fn domains_for_service<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(Column::ServiceId.eq(service_id))
        .order_by_asc(Column::Id)
        .all(db)
        .await
}

/// Every domain row; the usage ingestor builds its host map from this.
pub async fn all_domains<C: ConnectionTrait>(db: &C) -> Result<Vec<Model>, DbErr> {
    Entity::find().order_by_asc(Column::Id).all(db).await
}

pub async fn insert_domain<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
    name: &str,
) -> Result<Model, DbErr> {
    ActiveModel {
        id: NotSet,
        service_id: Set(service_id),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await
}

/// Returns the number of rows removed (0 means not found).
pub async fn delete_domain<C: ConnectionTrait>(
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
