//! Row → domain type mapping.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::Row;
use wlp_schemas::{DateRange, Order, OrderKind, OrderStatus, Payment, PaymentStatus};

pub(crate) fn order_from_row(row: &PgRow) -> Result<Order> {
    let kind_s: String = row.try_get("kind")?;
    let status_s: String = row.try_get("status")?;
    let previous_s: Option<String> = row.try_get("previous_status")?;

    let previous_status = previous_s
        .map(|s| {
            OrderStatus::parse(&s).ok_or_else(|| anyhow!("invalid previous order status: {s}"))
        })
        .transpose()?;

    let start: Option<NaiveDate> = row.try_get("start_date")?;
    let end: Option<NaiveDate> = row.try_get("end_date")?;

    Ok(Order {
        id: row.try_get("id")?,
        renter_id: row.try_get("renter_id")?,
        owner_id: row.try_get("owner_id")?,
        item_id: row.try_get("item_id")?,
        kind: OrderKind::parse(&kind_s).ok_or_else(|| anyhow!("invalid order kind: {kind_s}"))?,
        status: OrderStatus::parse(&status_s)
            .ok_or_else(|| anyhow!("invalid order status: {status_s}"))?,
        previous_status,
        version: row.try_get("version")?,
        window: start.zip(end).map(|(start, end)| DateRange { start, end }),
        idempotency_key: row.try_get("idempotency_key")?,
        deleted_at: row.try_get("deleted_at")?,
        has_active_dispute: row.try_get("has_active_dispute")?,
        dispute_count: row.try_get("dispute_count")?,
        dispute_locked_at: row.try_get("dispute_locked_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn payment_from_row(row: &PgRow) -> Result<Payment> {
    let status_s: String = row.try_get("status")?;

    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        status: PaymentStatus::parse(&status_s)
            .ok_or_else(|| anyhow!("invalid payment status: {status_s}"))?,
        amount: row.try_get("amount")?,
        refund_amount: row.try_get("refund_amount")?,
        captured_at: row.try_get("captured_at")?,
        failed_at: row.try_get("failed_at")?,
        refunded_at: row.try_get("refunded_at")?,
        created_at: row.try_get("created_at")?,
    })
}
