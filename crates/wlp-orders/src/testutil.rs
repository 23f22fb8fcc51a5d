//! Fixture builders shared by the unit tests and the test harnesses.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use wlp_schemas::{
    DateRange, ItemSnapshot, NewOrder, Order, OrderKind, OrderStatus, Payment, PaymentStatus,
};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid calendar day")
}

pub fn rent_window(start: NaiveDate, end: NaiveDate) -> DateRange {
    DateRange::new(start, end)
}

pub fn item(id: i64, owner_id: i64) -> ItemSnapshot {
    ItemSnapshot {
        id,
        owner_id,
        title: format!("listing-{id}"),
        deleted_at: None,
    }
}

/// RENT creation request from renter 10 against owner 20.
pub fn rent_request(item_id: i64, start: NaiveDate, end: NaiveDate) -> NewOrder {
    NewOrder {
        renter_id: 10,
        owner_id: 20,
        item_id,
        kind: OrderKind::Rent,
        window: Some(DateRange::new(start, end)),
        idempotency_key: None,
    }
}

/// Seeded order pinned at `status`, version 0, for transition tests.
pub fn order_in(id: i64, status: OrderStatus, window: DateRange) -> Order {
    let now = Utc::now();
    Order {
        id,
        renter_id: 10,
        owner_id: 20,
        item_id: 7,
        kind: OrderKind::Rent,
        status,
        previous_status: None,
        version: 0,
        window: Some(window),
        idempotency_key: None,
        deleted_at: None,
        has_active_dispute: false,
        dispute_count: 0,
        dispute_locked_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn authorized_payment(id: i64, order_id: i64, amount: Decimal) -> Payment {
    Payment {
        id,
        order_id,
        status: PaymentStatus::Authorized,
        amount,
        refund_amount: None,
        captured_at: None,
        failed_at: None,
        refunded_at: None,
        created_at: Utc::now(),
    }
}
