//! Unit-of-work storage abstraction.
//!
//! Every coordinator method runs inside exactly one [`StoreTx`]: validate,
//! mutate data, bump version, append audit — all visible together or not at
//! all. [`StoreTx::commit`] consumes the transaction; dropping it without
//! commit rolls everything back.
//!
//! Implementations must give a transaction at least read-committed isolation
//! plus the two explicit race-closers the contract below names:
//! the conflict-check reads of [`rent_orders_for_item`] must serialize
//! against concurrent inserts for the same item, and
//! [`update_order_status`] must be a compare-and-set on `expect_version`.
//!
//! [`rent_orders_for_item`]: StoreTx::rent_orders_for_item
//! [`update_order_status`]: StoreTx::update_order_status

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use wlp_schemas::{
    AuditEntry, ItemSnapshot, NewOrder, Order, OrderStatus, Payment, PaymentStatus,
};

use crate::error::OrderError;

/// Compare-and-set status mutation. The write must be conditioned on
/// `expect_version` still matching at commit time; on a miss the store
/// returns `None` and leaves the row untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub order_id: i64,
    pub expect_version: i64,
    pub new_status: OrderStatus,
    pub previous_status: OrderStatus,
}

/// Payment mutation applied by the payment coordinator. Timestamp fields are
/// written only when `Some`; each is set exactly once over a payment's life,
/// which the coordinator guarantees by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdate {
    pub payment_id: i64,
    pub status: PaymentStatus,
    pub refund_amount: Option<Decimal>,
    pub captured_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl PaymentUpdate {
    pub fn capture(payment_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            payment_id,
            status: PaymentStatus::Captured,
            refund_amount: None,
            captured_at: Some(at),
            failed_at: None,
            refunded_at: None,
        }
    }

    pub fn fail(payment_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            payment_id,
            status: PaymentStatus::Failed,
            refund_amount: None,
            captured_at: None,
            failed_at: Some(at),
            refunded_at: None,
        }
    }

    pub fn refund(payment_id: i64, status: PaymentStatus, amount: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            payment_id,
            status,
            refund_amount: Some(amount),
            captured_at: None,
            failed_at: None,
            refunded_at: Some(at),
        }
    }
}

/// One open transaction against the backing store.
#[async_trait]
pub trait StoreTx: Send {
    /// Item lookup honoring soft-delete (`None` for missing or delisted).
    async fn find_active_item(&mut self, item_id: i64) -> Result<Option<ItemSnapshot>, OrderError>;

    /// Order lookup honoring soft-delete.
    async fn find_order(&mut self, order_id: i64) -> Result<Option<Order>, OrderError>;

    /// Idempotency lookup: non-deleted order carrying `key`, if any.
    async fn find_order_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<Order>, OrderError>;

    /// All non-deleted RENT orders for `item_id`, for conflict scanning.
    /// Must serialize against concurrent order inserts for the same item so
    /// two overlapping creations cannot both pass the scan.
    async fn rent_orders_for_item(&mut self, item_id: i64) -> Result<Vec<Order>, OrderError>;

    /// Insert a new order in REQUESTED at version 0; the store assigns id
    /// and timestamps.
    async fn insert_order(&mut self, new: &NewOrder) -> Result<Order, OrderError>;

    /// Compare-and-set status update; `None` when `expect_version` no longer
    /// matches (the row is left untouched).
    async fn update_order_status(
        &mut self,
        update: &StatusUpdate,
    ) -> Result<Option<Order>, OrderError>;

    async fn find_payment(&mut self, payment_id: i64) -> Result<Option<Payment>, OrderError>;

    async fn update_payment(&mut self, update: &PaymentUpdate) -> Result<Payment, OrderError>;

    /// Append one audit entry. Same transaction as the mutation it
    /// describes — an entry must never become visible without its mutation
    /// or vice versa.
    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), OrderError>;

    /// Make every effect of this transaction visible atomically.
    async fn commit(self: Box<Self>) -> Result<(), OrderError>;
}

/// Transaction factory. Coordinators hold a `Store` and open one transaction
/// per operation; they never cache row state across operations.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, OrderError>;
}
