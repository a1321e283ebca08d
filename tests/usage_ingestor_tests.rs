//! Usage ingestor tests with a scripted provider.

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::EntityTrait;

use tranche::cdn::{CdnError, Ingestor, UsageProvider, WindowedUsage};
use tranche::models::usage_snapshot;

const HOUR: Duration = Duration::from_secs(3600);

struct ScriptedProvider {
    usages: Vec<WindowedUsage>,
}

#[async_trait]
impl UsageProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn usage(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _window: Duration,
        _hosts: &[String],
    ) -> Result<Vec<WindowedUsage>, CdnError> {
        Ok(self.usages.clone())
    }
}

fn hour(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 10, h, 0, 0).unwrap()
}

fn usage(host: &str, start: DateTime<Utc>, end: DateTime<Utc>, bytes: i64) -> WindowedUsage {
    WindowedUsage {
        host: host.to_string(),
        window_start: start,
        window_end: end,
        bytes,
    }
}

fn ingestor(db: &sea_orm::DatabaseConnection, usages: Vec<WindowedUsage>) -> Ingestor {
    Ingestor::new(
        db.clone(),
        Arc::new(ScriptedProvider { usages }),
        HOUR,
        Duration::from_secs(6 * 3600),
        Duration::from_secs(300),
    )
}

#[tokio::test]
async fn aggregates_domains_into_service_windows() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customer = test_utils::create_customer(&db, "acme").await.unwrap();
    let service = test_utils::create_service(&db, customer.id, "app").await.unwrap();
    test_utils::create_domain(&db, service.id, "app.example.com").await.unwrap();
    test_utils::create_domain(&db, service.id, "www.example.com").await.unwrap();

    let usages = vec![
        usage("app.example.com", hour(8), hour(9), 1000),
        usage("www.example.com", hour(8), hour(9), 500),
        usage("app.example.com", hour(9), hour(10), 2000),
    ];
    ingestor(&db, usages)
        .run_once(hour(10) + chrono::Duration::minutes(7))
        .await
        .unwrap();

    let mut snapshots = usage_snapshot::Entity::find().all(&db).await.unwrap();
    snapshots.sort_by_key(|s| s.window_start);
    assert_eq!(snapshots.len(), 2);

    assert_eq!(snapshots[0].service_id, service.id);
    assert_eq!(snapshots[0].window_start.with_timezone(&Utc), hour(8));
    assert_eq!(snapshots[0].window_end.with_timezone(&Utc), hour(9));
    assert_eq!(snapshots[0].primary_bytes, 1500);
    assert_eq!(snapshots[0].invoice_id, None);

    assert_eq!(snapshots[1].primary_bytes, 2000);
}

#[tokio::test]
async fn unknown_hosts_and_misaligned_windows_are_dropped() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customer = test_utils::create_customer(&db, "acme").await.unwrap();
    let service = test_utils::create_service(&db, customer.id, "app").await.unwrap();
    test_utils::create_domain(&db, service.id, "app.example.com").await.unwrap();

    let usages = vec![
        usage("stranger.example.org", hour(8), hour(9), 999),
        // Start not aligned to the hour.
        usage(
            "app.example.com",
            hour(8) + chrono::Duration::minutes(10),
            hour(9),
            999,
        ),
        // End does not close the window.
        usage("app.example.com", hour(8), hour(10), 999),
        usage("app.example.com", hour(8), hour(9), 123),
    ];
    ingestor(&db, usages).run_once(hour(10)).await.unwrap();

    let snapshots = usage_snapshot::Entity::find().all(&db).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].primary_bytes, 123);
}

#[tokio::test]
async fn reingestion_is_idempotent() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customer = test_utils::create_customer(&db, "acme").await.unwrap();
    let service = test_utils::create_service(&db, customer.id, "app").await.unwrap();
    test_utils::create_domain(&db, service.id, "app.example.com").await.unwrap();

    let first = vec![usage("app.example.com", hour(8), hour(9), 100)];
    ingestor(&db, first).run_once(hour(10)).await.unwrap();

    // Second pass over the same window with fresher totals.
    let second = vec![usage("app.example.com", hour(8), hour(9), 150)];
    ingestor(&db, second).run_once(hour(10)).await.unwrap();

    let snapshots = usage_snapshot::Entity::find().all(&db).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].primary_bytes, 150);
}

#[tokio::test]
async fn soft_deleted_services_are_skipped() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customer = test_utils::create_customer(&db, "acme").await.unwrap();
    let service = test_utils::create_service(&db, customer.id, "app").await.unwrap();
    test_utils::create_domain(&db, service.id, "app.example.com").await.unwrap();
    tranche::repositories::service::soft_delete_service(&db, service.id, customer.id, Utc::now())
        .await
        .unwrap();

    let usages = vec![usage("app.example.com", hour(8), hour(9), 100)];
    ingestor(&db, usages).run_once(hour(10)).await.unwrap();

    assert!(usage_snapshot::Entity::find().all(&db).await.unwrap().is_empty());
}
