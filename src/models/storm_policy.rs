//! StormPolicy entity model.
//!
//! A service may carry several policies distinguished by `kind`. Each
//! policy describes when availability degradation counts as a storm
//! (threshold over a window), how long re-opening is suppressed after a
//! previous event (cooldown), and the billing coverage cap.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "storm_policies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub service_id: i64,
    /// Free-form policy discriminator, e.g. `http_availability`.
    pub kind: String,
    /// Availability threshold in (0, 1].
    pub threshold_avail: f64,
    /// Evaluation window in seconds, > 0.
    pub window_seconds: i32,
    /// Seconds a new event is suppressed after the previous one, >= 0.
    pub cooldown_seconds: i32,
    /// Upper bound on the billing coverage factor, > 0.
    pub max_coverage_factor: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::service::Entity",
        from = "Column::ServiceId",
        to = "super::service::Column::Id"
    )]
    Service,
}

impl Related<super::service::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Service.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
