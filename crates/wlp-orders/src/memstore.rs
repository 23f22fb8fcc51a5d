//! In-memory store for tests and harnesses.
//!
//! A transaction clones the whole state, mutates the clone and swaps it back
//! on commit; dropping the transaction discards the clone. The state mutex
//! is held for the life of the transaction, so transactions are fully
//! serialized — the strongest isolation the store contract asks for, which
//! makes the concurrent-creation and version races deterministic in tests.
//!
//! Not a production store: the lock-per-transaction model caps throughput
//! at one writer, fine for a test double.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use wlp_schemas::{
    AuditEntry, ItemSnapshot, NewOrder, Order, OrderStatus, Payment,
};

use crate::error::OrderError;
use crate::store::{PaymentUpdate, StatusUpdate, Store, StoreTx};

#[derive(Debug, Clone, Default)]
struct MemState {
    items: BTreeMap<i64, ItemSnapshot>,
    orders: BTreeMap<i64, Order>,
    payments: BTreeMap<i64, Payment>,
    audit: Vec<AuditEntry>,
    next_order_id: i64,
}

#[derive(Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<MemState>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- seeding / assertion helpers (outside any transaction) -------------

    pub async fn seed_item(&self, item: ItemSnapshot) {
        self.state.lock().await.items.insert(item.id, item);
    }

    pub async fn seed_order(&self, order: Order) {
        let mut state = self.state.lock().await;
        state.next_order_id = state.next_order_id.max(order.id);
        state.orders.insert(order.id, order);
    }

    pub async fn seed_payment(&self, payment: Payment) {
        self.state.lock().await.payments.insert(payment.id, payment);
    }

    pub async fn order(&self, order_id: i64) -> Option<Order> {
        self.state.lock().await.orders.get(&order_id).cloned()
    }

    pub async fn payment(&self, payment_id: i64) -> Option<Payment> {
        self.state.lock().await.payments.get(&payment_id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().await.audit.clone()
    }
}

struct MemTx {
    guard: OwnedMutexGuard<MemState>,
    work: MemState,
}

#[async_trait]
impl Store for MemStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, OrderError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemTx { guard, work }))
    }
}

#[async_trait]
impl StoreTx for MemTx {
    async fn find_active_item(&mut self, item_id: i64) -> Result<Option<ItemSnapshot>, OrderError> {
        Ok(self
            .work
            .items
            .get(&item_id)
            .filter(|item| item.is_active())
            .cloned())
    }

    async fn find_order(&mut self, order_id: i64) -> Result<Option<Order>, OrderError> {
        Ok(self
            .work
            .orders
            .get(&order_id)
            .filter(|order| order.deleted_at.is_none())
            .cloned())
    }

    async fn find_order_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<Order>, OrderError> {
        Ok(self
            .work
            .orders
            .values()
            .find(|order| {
                order.deleted_at.is_none() && order.idempotency_key.as_deref() == Some(key)
            })
            .cloned())
    }

    async fn rent_orders_for_item(&mut self, item_id: i64) -> Result<Vec<Order>, OrderError> {
        Ok(self
            .work
            .orders
            .values()
            .filter(|order| {
                order.item_id == item_id
                    && order.deleted_at.is_none()
                    && order.kind == wlp_schemas::OrderKind::Rent
            })
            .cloned()
            .collect())
    }

    async fn insert_order(&mut self, new: &NewOrder) -> Result<Order, OrderError> {
        self.work.next_order_id += 1;
        let now = Utc::now();
        let order = Order {
            id: self.work.next_order_id,
            renter_id: new.renter_id,
            owner_id: new.owner_id,
            item_id: new.item_id,
            kind: new.kind,
            status: OrderStatus::Requested,
            previous_status: None,
            version: 0,
            window: new.window,
            idempotency_key: new.idempotency_key.clone(),
            deleted_at: None,
            has_active_dispute: false,
            dispute_count: 0,
            dispute_locked_at: None,
            created_at: now,
            updated_at: now,
        };
        self.work.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn update_order_status(
        &mut self,
        update: &StatusUpdate,
    ) -> Result<Option<Order>, OrderError> {
        let Some(order) = self.work.orders.get_mut(&update.order_id) else {
            return Ok(None);
        };
        if order.deleted_at.is_some() || order.version != update.expect_version {
            return Ok(None);
        }
        order.previous_status = Some(update.previous_status);
        order.status = update.new_status;
        order.version += 1;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn find_payment(&mut self, payment_id: i64) -> Result<Option<Payment>, OrderError> {
        Ok(self.work.payments.get(&payment_id).cloned())
    }

    async fn update_payment(&mut self, update: &PaymentUpdate) -> Result<Payment, OrderError> {
        let payment = self
            .work
            .payments
            .get_mut(&update.payment_id)
            .ok_or(OrderError::PaymentNotFound {
                payment_id: update.payment_id,
            })?;
        payment.status = update.status;
        if update.refund_amount.is_some() {
            payment.refund_amount = update.refund_amount;
        }
        if update.captured_at.is_some() {
            payment.captured_at = update.captured_at;
        }
        if update.failed_at.is_some() {
            payment.failed_at = update.failed_at;
        }
        if update.refunded_at.is_some() {
            payment.refunded_at = update.refunded_at;
        }
        Ok(payment.clone())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), OrderError> {
        self.work.audit.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), OrderError> {
        let MemTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
