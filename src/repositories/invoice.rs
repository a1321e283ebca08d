//! Invoice and line-item inserts, always executed inside the billing
//! transaction.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbErr, NotSet, Set};

use crate::models::invoice;
use crate::models::invoice_line_item;

#[allow(clippy::too_many_arguments)]
pub async fn insert_invoice<C: ConnectionTrait>(
    db: &C,
    customer_id: i64,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    subtotal_cents: i64,
    discount_cents: i64,
    total_cents: i64,
) -> Result<invoice::Model, DbErr> {
    invoice::ActiveModel {
        id: NotSet,
        customer_id: Set(customer_id),
        period_start: Set(period_start.fixed_offset()),
        period_end: Set(period_end.fixed_offset()),
        subtotal_cents: Set(subtotal_cents),
        discount_cents: Set(discount_cents),
        total_cents: Set(total_cents),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_line_item<C: ConnectionTrait>(
    db: &C,
    invoice_id: i64,
    service_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    primary_bytes: i64,
    backup_bytes: i64,
    coverage_factor: f64,
    amount_cents: i64,
    discount_cents: i64,
) -> Result<invoice_line_item::Model, DbErr> {
    invoice_line_item::ActiveModel {
        id: NotSet,
        invoice_id: Set(invoice_id),
        service_id: Set(service_id),
        window_start: Set(window_start.fixed_offset()),
        window_end: Set(window_end.fixed_offset()),
        primary_bytes: Set(primary_bytes),
        backup_bytes: Set(backup_bytes),
        coverage_factor: Set(coverage_factor),
        amount_cents: Set(amount_cents),
        discount_cents: Set(discount_cents),
    }
    .insert(db)
    .await
}
