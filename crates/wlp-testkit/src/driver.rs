//! Scripted lifecycle driver over the in-memory store.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use wlp_orders::error::OrderError;
use wlp_orders::memstore::MemStore;
use wlp_orders::testutil;
use wlp_orders::{OrderTransactionCoordinator, PaymentOrderCoordinator};
use wlp_schemas::{NewOrder, Order, OrderKind, OrderStatus, Payment};

/// Result of a full rental round trip.
#[derive(Debug, Clone)]
pub struct RentalRun {
    pub order: Order,
    pub payment: Payment,
    pub audit_entries: usize,
}

/// An in-memory marketplace: seeded listings, both coordinators, and
/// helpers that walk orders through their lifecycle the way the real
/// adapters would.
pub struct LifecycleDriver {
    store: MemStore,
    orders: OrderTransactionCoordinator<MemStore>,
    payments: PaymentOrderCoordinator<MemStore>,
    next_payment_id: AtomicI64,
}

impl Default for LifecycleDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleDriver {
    pub fn new() -> Self {
        let store = MemStore::new();
        Self {
            orders: OrderTransactionCoordinator::new(store.clone()),
            payments: PaymentOrderCoordinator::new(store.clone()),
            store,
            next_payment_id: AtomicI64::new(500),
        }
    }

    pub fn store(&self) -> &MemStore {
        &self.store
    }

    pub fn orders(&self) -> &OrderTransactionCoordinator<MemStore> {
        &self.orders
    }

    pub fn payments(&self) -> &PaymentOrderCoordinator<MemStore> {
        &self.payments
    }

    /// Seed a listing owned by `owner_id`.
    pub async fn seed_listing(&self, item_id: i64, owner_id: i64) {
        self.store.seed_item(testutil::item(item_id, owner_id)).await;
    }

    /// Renter books `item_id` for the window; order lands in REQUESTED.
    pub async fn book(
        &self,
        renter_id: i64,
        owner_id: i64,
        item_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Order, OrderError> {
        self.orders
            .create_order(
                renter_id,
                NewOrder {
                    renter_id,
                    owner_id,
                    item_id,
                    kind: OrderKind::Rent,
                    window: Some(wlp_schemas::DateRange::new(start, end)),
                    idempotency_key: None,
                },
            )
            .await
    }

    /// Owner approves, provider authorizes, and the charge is captured:
    /// order ends up PAID with a CAPTURED payment.
    pub async fn approve_and_capture(
        &self,
        order: &Order,
        amount: Decimal,
    ) -> Result<(Order, Payment), OrderError> {
        self.orders
            .update_order_status(order.id, OrderStatus::Approved, order.owner_id, None)
            .await?;

        let payment_id = self.next_payment_id.fetch_add(1, Ordering::SeqCst);
        self.store
            .seed_payment(testutil::authorized_payment(payment_id, order.id, amount))
            .await;

        let outcome = self
            .payments
            .capture_payment_and_update_order(payment_id, order.id, order.renter_id)
            .await?;
        Ok((outcome.order, outcome.payment))
    }

    /// Walk one rental from booking to completion:
    /// REQUESTED → APPROVED → PAID → DISPATCHED → DELIVERED →
    /// RETURN_REQUESTED → RETURNED → COMPLETED.
    pub async fn run_full_rental(
        &self,
        renter_id: i64,
        owner_id: i64,
        item_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        amount: Decimal,
    ) -> Result<RentalRun, OrderError> {
        let order = self.book(renter_id, owner_id, item_id, start, end).await?;
        let (order, payment) = self.approve_and_capture(&order, amount).await?;

        let mut order = order;
        for (status, actor) in [
            (OrderStatus::Dispatched, owner_id),
            (OrderStatus::Delivered, owner_id),
            (OrderStatus::ReturnRequested, renter_id),
            (OrderStatus::Returned, owner_id),
            (OrderStatus::Completed, owner_id),
        ] {
            order = self
                .orders
                .update_order_status(order.id, status, actor, Some(order.version))
                .await?;
        }

        let audit_entries = self.store.audit_entries().await.len();
        Ok(RentalRun {
            order,
            payment,
            audit_entries,
        })
    }
}
