//! CustomerToken queries backing control-plane authentication.

use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};

use crate::models::customer_token::{Column, Entity};

/// Resolves a SHA-256 token hash to its customer; revoked tokens do not
/// match.
pub async fn customer_id_for_token_hash<C: ConnectionTrait>(
    db: &C,
    token_hash: &str,
) -> Result<Option<i64>, DbErr> {
    let token = Entity::find()
        .filter(Column::TokenHash.eq(token_hash))
        .filter(Column::RevokedAt.is_null())
        .one(db)
        .await?;
    Ok(token.map(|t| t.customer_id))
}
