//! # Routing planner
//!
//! Translates storm state into desired DNS weights: any open storm
//! steers all traffic to the backup record, otherwise everything stays
//! on the primary. Weights always sum to 100.

pub mod reconciler;

use sea_orm::{ConnectionTrait, DbErr};

use crate::repositories::storm_event;

pub use reconciler::Reconciler;

/// Desired primary/backup weight split for a service's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weights {
    pub primary: i64,
    pub backup: i64,
}

impl Weights {
    /// All traffic on the primary record.
    pub const PRIMARY: Weights = Weights {
        primary: 100,
        backup: 0,
    };
    /// All traffic failed over to the backup record.
    pub const FAILOVER: Weights = Weights {
        primary: 0,
        backup: 100,
    };
}

/// Weights for one service given its current storm state.
pub async fn desired_routing<C: ConnectionTrait>(
    db: &C,
    service_id: i64,
) -> Result<Weights, DbErr> {
    let open_storms = storm_event::active_for_service(db, service_id).await?;
    if open_storms.is_empty() {
        Ok(Weights::PRIMARY)
    } else {
        Ok(Weights::FAILOVER)
    }
}
