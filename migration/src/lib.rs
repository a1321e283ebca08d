//! Database migrations for the Tranche control plane.
//!
//! Schema DDL lives here as SeaORM migrations; binaries apply pending
//! versions at startup under a shared Postgres advisory lock.

pub use sea_orm_migration::prelude::*;

mod m2025_05_10_090000_create_customers;
mod m2025_05_10_090100_create_services;
mod m2025_05_10_090200_create_service_domains;
mod m2025_05_10_090300_create_storm_policies;
mod m2025_05_10_090400_create_storm_events;
mod m2025_05_10_090500_create_probe_samples;
mod m2025_05_10_090600_create_invoices;
mod m2025_05_10_090700_create_usage_snapshots;
mod m2025_05_10_090800_create_customer_tokens;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_05_10_090000_create_customers::Migration),
            Box::new(m2025_05_10_090100_create_services::Migration),
            Box::new(m2025_05_10_090200_create_service_domains::Migration),
            Box::new(m2025_05_10_090300_create_storm_policies::Migration),
            Box::new(m2025_05_10_090400_create_storm_events::Migration),
            Box::new(m2025_05_10_090500_create_probe_samples::Migration),
            Box::new(m2025_05_10_090600_create_invoices::Migration),
            Box::new(m2025_05_10_090700_create_usage_snapshots::Migration),
            Box::new(m2025_05_10_090800_create_customer_tokens::Migration),
        ]
    }
}
