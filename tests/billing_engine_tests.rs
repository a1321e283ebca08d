//! Billing engine tests: discount arithmetic, invoice invariants, and
//! exactly-once snapshot consumption.

mod test_utils;

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use tranche::billing::{BillingConfig, Engine};
use tranche::models::{invoice, invoice_line_item, usage_snapshot};
use tranche::repositories::{storm_event, usage_snapshot as snapshots};

const GIB: i64 = 1 << 30;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap()
}

fn engine(db: &sea_orm::DatabaseConnection, discount_rate: f64) -> Engine {
    Engine::new(
        db.clone(),
        BillingConfig {
            period: std::time::Duration::from_secs(24 * 3600),
            rate_cents_per_gb: 12,
            discount_rate,
        },
    )
}

/// 1 GiB each way, a storm covering half the window, cap 1.5: subtotal
/// 24, coverage 0.75, discount 5, total 19.
#[tokio::test]
async fn storm_discount_is_coverage_capped() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customer = test_utils::create_customer(&db, "acme").await.unwrap();
    let service = test_utils::create_service(&db, customer.id, "app").await.unwrap();
    test_utils::create_policy(&db, service.id, "failover", 0.9, 60, 0, 1.5)
        .await
        .unwrap();

    let window_start = now() - chrono::Duration::hours(1);
    let window_end = now();
    snapshots::upsert_snapshot(&db, service.id, window_start, window_end, GIB, GIB)
        .await
        .unwrap();

    let storm = storm_event::open_event(&db, service.id, "failover", window_start)
        .await
        .unwrap();
    storm_event::resolve_event(&db, storm.id, window_start + chrono::Duration::minutes(30))
        .await
        .unwrap();

    let emitted = engine(&db, 0.5).run_once(now()).await.unwrap();
    assert_eq!(emitted, 1);

    let minted = invoice::Entity::find().one(&db).await.unwrap().unwrap();
    assert_eq!(minted.customer_id, customer.id);
    assert_eq!(minted.subtotal_cents, 24);
    assert_eq!(minted.discount_cents, 5);
    assert_eq!(minted.total_cents, 19);

    let lines = invoice_line_item::Entity::find()
        .filter(invoice_line_item::Column::InvoiceId.eq(minted.id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].amount_cents, 24);
    assert_eq!(lines[0].discount_cents, 5);
    assert!((lines[0].coverage_factor - 0.75).abs() < 1e-9);

    let snapshot = usage_snapshot::Entity::find().one(&db).await.unwrap().unwrap();
    assert_eq!(snapshot.invoice_id, Some(minted.id));
}

#[tokio::test]
async fn billed_snapshots_are_never_rebilled() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customer = test_utils::create_customer(&db, "acme").await.unwrap();
    let service = test_utils::create_service(&db, customer.id, "app").await.unwrap();

    let window_start = now() - chrono::Duration::hours(2);
    snapshots::upsert_snapshot(
        &db,
        service.id,
        window_start,
        window_start + chrono::Duration::hours(1),
        GIB,
        0,
    )
    .await
    .unwrap();

    let first = engine(&db, 0.5).run_once(now()).await.unwrap();
    assert_eq!(first, 1);

    let second = engine(&db, 0.5).run_once(now()).await.unwrap();
    assert_eq!(second, 0);
    assert_eq!(
        invoice::Entity::find().all(&db).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn invoice_totals_equal_line_item_sums() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customer = test_utils::create_customer(&db, "acme").await.unwrap();
    let svc_a = test_utils::create_service(&db, customer.id, "app-a").await.unwrap();
    let svc_b = test_utils::create_service(&db, customer.id, "app-b").await.unwrap();

    for (svc, hours_ago, bytes) in [(&svc_a, 3, 2 * GIB), (&svc_a, 2, GIB), (&svc_b, 1, 5 * GIB)] {
        let start = now() - chrono::Duration::hours(hours_ago);
        snapshots::upsert_snapshot(
            &db,
            svc.id,
            start,
            start + chrono::Duration::hours(1),
            bytes,
            0,
        )
        .await
        .unwrap();
    }

    let emitted = engine(&db, 0.5).run_once(now()).await.unwrap();
    assert_eq!(emitted, 1);

    let minted = invoice::Entity::find().one(&db).await.unwrap().unwrap();
    let lines = invoice_line_item::Entity::find()
        .filter(invoice_line_item::Column::InvoiceId.eq(minted.id))
        .all(&db)
        .await
        .unwrap();

    assert_eq!(lines.len(), 3);
    let subtotal: i64 = lines.iter().map(|l| l.amount_cents).sum();
    let discount: i64 = lines.iter().map(|l| l.discount_cents).sum();
    assert_eq!(minted.subtotal_cents, subtotal);
    assert_eq!(minted.discount_cents, discount);
    assert_eq!(minted.total_cents, subtotal - discount);

    // Lines are ordered by window start and the period encloses them.
    assert!(lines.windows(2).all(|w| w[0].window_start <= w[1].window_start));
    assert!(minted.period_start.with_timezone(&Utc) <= now() - chrono::Duration::hours(3));
    assert_eq!(minted.period_end.with_timezone(&Utc), now());
}

#[tokio::test]
async fn customers_get_separate_invoices() {
    let db = test_utils::setup_test_db().await.unwrap();
    let acme = test_utils::create_customer(&db, "acme").await.unwrap();
    let globex = test_utils::create_customer(&db, "globex").await.unwrap();
    let svc_a = test_utils::create_service(&db, acme.id, "app-a").await.unwrap();
    let svc_b = test_utils::create_service(&db, globex.id, "app-b").await.unwrap();

    for svc in [&svc_a, &svc_b] {
        let start = now() - chrono::Duration::hours(1);
        snapshots::upsert_snapshot(&db, svc.id, start, now(), GIB, 0)
            .await
            .unwrap();
    }

    let emitted = engine(&db, 0.0).run_once(now()).await.unwrap();
    assert_eq!(emitted, 2);

    let invoices = invoice::Entity::find().all(&db).await.unwrap();
    let mut customers: Vec<i64> = invoices.iter().map(|i| i.customer_id).collect();
    customers.sort_unstable();
    assert_eq!(customers, vec![acme.id, globex.id]);
}

#[tokio::test]
async fn discount_never_exceeds_line_subtotal() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customer = test_utils::create_customer(&db, "acme").await.unwrap();
    let service = test_utils::create_service(&db, customer.id, "app").await.unwrap();
    // Absurd cap to push the raw discount past the subtotal.
    test_utils::create_policy(&db, service.id, "failover", 0.9, 60, 0, 10.0)
        .await
        .unwrap();

    let window_start = now() - chrono::Duration::hours(1);
    snapshots::upsert_snapshot(&db, service.id, window_start, now(), 0, GIB)
        .await
        .unwrap();
    storm_event::open_event(&db, service.id, "failover", window_start)
        .await
        .unwrap();

    engine(&db, 1.0).run_once(now()).await.unwrap();

    let minted = invoice::Entity::find().one(&db).await.unwrap().unwrap();
    assert!(minted.discount_cents <= minted.subtotal_cents);
    assert!(minted.total_cents >= 0);
}

#[tokio::test]
async fn snapshots_outside_the_period_wait() {
    let db = test_utils::setup_test_db().await.unwrap();
    let customer = test_utils::create_customer(&db, "acme").await.unwrap();
    let service = test_utils::create_service(&db, customer.id, "app").await.unwrap();

    let old_start = now() - chrono::Duration::days(3);
    snapshots::upsert_snapshot(
        &db,
        service.id,
        old_start,
        old_start + chrono::Duration::hours(1),
        GIB,
        0,
    )
    .await
    .unwrap();

    let emitted = engine(&db, 0.5).run_once(now()).await.unwrap();
    assert_eq!(emitted, 0);
}
