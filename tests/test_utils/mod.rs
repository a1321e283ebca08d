//! Shared helpers for integration tests.
//!
//! Tests run against an in-memory SQLite database with all migrations
//! applied; fixture rows are inserted through the entity layer.
#![allow(dead_code)]

use anyhow::Result;
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, NotSet, Set};

use tranche::models::{customer, customer_token, service, service_domain, storm_policy};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub async fn create_customer(db: &DatabaseConnection, name: &str) -> Result<customer::Model> {
    let model = customer::ActiveModel {
        id: NotSet,
        name: Set(name.to_string()),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await?;
    Ok(model)
}

pub async fn create_service(
    db: &DatabaseConnection,
    customer_id: i64,
    name: &str,
) -> Result<service::Model> {
    let model = service::ActiveModel {
        id: NotSet,
        customer_id: Set(customer_id),
        name: Set(name.to_string()),
        primary_cdn: Set("cdn-a.example.net".to_string()),
        backup_cdn: Set("cdn-b.example.net".to_string()),
        created_at: Set(Utc::now().fixed_offset()),
        deleted_at: Set(None),
    }
    .insert(db)
    .await?;
    Ok(model)
}

pub async fn create_domain(
    db: &DatabaseConnection,
    service_id: i64,
    name: &str,
) -> Result<service_domain::Model> {
    let model = service_domain::ActiveModel {
        id: NotSet,
        service_id: Set(service_id),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await?;
    Ok(model)
}

#[allow(clippy::too_many_arguments)]
pub async fn create_policy(
    db: &DatabaseConnection,
    service_id: i64,
    kind: &str,
    threshold_avail: f64,
    window_seconds: i32,
    cooldown_seconds: i32,
    max_coverage_factor: f64,
) -> Result<storm_policy::Model> {
    let model = storm_policy::ActiveModel {
        id: NotSet,
        service_id: Set(service_id),
        kind: Set(kind.to_string()),
        threshold_avail: Set(threshold_avail),
        window_seconds: Set(window_seconds),
        cooldown_seconds: Set(cooldown_seconds),
        max_coverage_factor: Set(max_coverage_factor),
    }
    .insert(db)
    .await?;
    Ok(model)
}

pub async fn create_token(
    db: &DatabaseConnection,
    customer_id: i64,
    token: &str,
) -> Result<customer_token::Model> {
    let model = customer_token::ActiveModel {
        id: NotSet,
        customer_id: Set(customer_id),
        token_hash: Set(tranche::auth::hash_token(token)),
        created_at: Set(Utc::now().fixed_offset()),
        revoked_at: Set(None),
    }
    .insert(db)
    .await?;
    Ok(model)
}
