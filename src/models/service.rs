//! Service entity model.
//!
//! A service is a logical application with a primary and backup CDN.
//! Rows are soft-deleted by setting `deleted_at`; every read path filters
//! on `deleted_at IS NULL`.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "services")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub customer_id: i64,
    pub name: String,
    /// Hostname of the primary CDN endpoint, e.g. `cdn-a.example.net`.
    pub primary_cdn: String,
    /// Hostname of the backup CDN endpoint.
    pub backup_cdn: String,
    pub created_at: DateTimeWithTimeZone,
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(has_many = "super::service_domain::Entity")]
    Domains,
    #[sea_orm(has_many = "super::storm_policy::Entity")]
    StormPolicies,
    #[sea_orm(has_many = "super::storm_event::Entity")]
    StormEvents,
    #[sea_orm(has_many = "super::usage_snapshot::Entity")]
    UsageSnapshots,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::service_domain::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Domains.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
