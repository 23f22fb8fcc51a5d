//! Shared domain types for the Wearloop order core.
//!
//! Every crate in the workspace speaks these types; none of them carry
//! behavior beyond string round-tripping for DB text columns.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// Lifecycle status of an order. Stored as TEXT in Postgres; the string
/// forms below are the canonical wire/DB spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Requested,
    Approved,
    Paid,
    Dispatched,
    Delivered,
    ReturnRequested,
    Returned,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Requested => "REQUESTED",
            OrderStatus::Approved => "APPROVED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Dispatched => "DISPATCHED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::ReturnRequested => "RETURN_REQUESTED",
            OrderStatus::Returned => "RETURNED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REQUESTED" => Some(OrderStatus::Requested),
            "APPROVED" => Some(OrderStatus::Approved),
            "PAID" => Some(OrderStatus::Paid),
            "DISPATCHED" => Some(OrderStatus::Dispatched),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "RETURN_REQUESTED" => Some(OrderStatus::ReturnRequested),
            "RETURNED" => Some(OrderStatus::Returned),
            "COMPLETED" => Some(OrderStatus::Completed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of transaction the order represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Rent,
    Buy,
    Swap,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Rent => "RENT",
            OrderKind::Buy => "BUY",
            OrderKind::Swap => "SWAP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RENT" => Some(OrderKind::Rent),
            "BUY" => Some(OrderKind::Buy),
            "SWAP" => Some(OrderKind::Swap),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive calendar-day booking window of a RENT order.
///
/// Bookings are day-granular: the handover day belongs to both the outgoing
/// and the incoming window, which is why overlap checks treat the bounds as
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

/// One rental/purchase/swap transaction between a renter and an owner over
/// one wardrobe item.
///
/// `status` is mutable only through validated lifecycle transitions;
/// `version` increments exactly once per successful status mutation and
/// backs optimistic concurrency control. Orders are never hard-deleted —
/// `deleted_at` soft-deletes them out of listings and conflict checks while
/// keeping the row for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub renter_id: i64,
    pub owner_id: i64,
    pub item_id: i64,
    pub kind: OrderKind,
    pub status: OrderStatus,
    /// Status before the most recent transition.
    pub previous_status: Option<OrderStatus>,
    pub version: i64,
    /// Booking window; populated for RENT orders only.
    pub window: Option<DateRange>,
    /// Client-supplied creation token; unique among non-deleted orders.
    pub idempotency_key: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Denormalized dispute tracking, written by the dispute subsystem and
    /// read-only here.
    pub has_active_dispute: bool,
    pub dispute_count: i32,
    pub dispute_locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to order creation; ids, status, version and timestamps are assigned
/// by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub renter_id: i64,
    pub owner_id: i64,
    pub item_id: i64,
    pub kind: OrderKind,
    pub window: Option<DateRange>,
    pub idempotency_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Payment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Authorized,
    Captured,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTHORIZED" => Some(PaymentStatus::Authorized),
            "CAPTURED" => Some(PaymentStatus::Captured),
            "FAILED" => Some(PaymentStatus::Failed),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            "PARTIALLY_REFUNDED" => Some(PaymentStatus::PartiallyRefunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monetary instrument tied to exactly one order. Created by the payment
/// provider integration; mutated only by the payment coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub status: PaymentStatus,
    /// Immutable once authorized.
    pub amount: Decimal,
    /// Set only on refund paths.
    pub refund_amount: Option<Decimal>,
    pub captured_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Item catalog surface
// ---------------------------------------------------------------------------

/// The slice of a wardrobe item the order core needs: existence and
/// soft-delete state. The catalog subsystem owns the full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ItemSnapshot {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntity {
    Order,
    Payment,
}

impl AuditEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntity::Order => "ORDER",
            AuditEntity::Payment => "PAYMENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ORDER" => Some(AuditEntity::Order),
            "PAYMENT" => Some(AuditEntity::Payment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Created,
    StatusChange,
    PaymentCaptured,
    PaymentFailed,
    PaymentRefunded,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "CREATED",
            AuditAction::StatusChange => "STATUS_CHANGE",
            AuditAction::PaymentCaptured => "PAYMENT_CAPTURED",
            AuditAction::PaymentFailed => "PAYMENT_FAILED",
            AuditAction::PaymentRefunded => "PAYMENT_REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(AuditAction::Created),
            "STATUS_CHANGE" => Some(AuditAction::StatusChange),
            "PAYMENT_CAPTURED" => Some(AuditAction::PaymentCaptured),
            "PAYMENT_FAILED" => Some(AuditAction::PaymentFailed),
            "PAYMENT_REFUNDED" => Some(AuditAction::PaymentRefunded),
            _ => None,
        }
    }
}

/// One audit trail entry, persisted in the same transaction as the mutation
/// it describes. Hash-chain decoration happens at export time, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entity: AuditEntity,
    pub entity_id: i64,
    pub action: AuditAction,
    pub actor_id: Option<i64>,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub ts_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_round_trips_through_db_strings() {
        let all = [
            OrderStatus::Requested,
            OrderStatus::Approved,
            OrderStatus::Paid,
            OrderStatus::Dispatched,
            OrderStatus::Delivered,
            OrderStatus::ReturnRequested,
            OrderStatus::Returned,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ];
        for status in all {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("SHIPPED"), None);
    }

    #[test]
    fn payment_status_round_trips_through_db_strings() {
        let all = [
            PaymentStatus::Authorized,
            PaymentStatus::Captured,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
            PaymentStatus::PartiallyRefunded,
        ];
        for status in all {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("VOIDED"), None);
    }

    #[test]
    fn serde_spelling_matches_db_spelling() {
        let json = serde_json::to_string(&OrderStatus::ReturnRequested).unwrap();
        assert_eq!(json, "\"RETURN_REQUESTED\"");
        let json = serde_json::to_string(&PaymentStatus::PartiallyRefunded).unwrap();
        assert_eq!(json, "\"PARTIALLY_REFUNDED\"");
    }
}
