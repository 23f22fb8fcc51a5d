//! Payment-driven order transitions.
//!
//! Invoked by payment-provider callbacks. Each operation pairs one payment
//! mutation with one order mutation (validated through the same lifecycle
//! table as every other transition) inside one store transaction — order
//! and payment state are never mutated independently of each other, and an
//! order reaches PAID only in the same atomic unit as its payment reaching
//! CAPTURED.
//!
//! Failure semantics: `OrderNotFound` fails fast before any payment read or
//! write; a lifecycle refusal aborts the whole operation with nothing
//! persisted.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};
use wlp_schemas::{
    AuditAction, AuditEntity, AuditEntry, Order, OrderStatus, Payment, PaymentStatus,
};

use crate::coordinator::OrderTransactionCoordinator;
use crate::error::OrderError;
use crate::lifecycle;
use crate::store::{PaymentUpdate, Store, StoreTx};

/// Payment + order pair after a capture or failure transition.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub order: Order,
}

/// Refund result. `order` is populated only when the full-refund branch
/// transitioned the order to CANCELLED; a partial refund leaves the order
/// untouched and returns `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundOutcome {
    pub payment: Payment,
    pub order: Option<Order>,
}

pub struct PaymentOrderCoordinator<S> {
    store: S,
    orders: OrderTransactionCoordinator<S>,
}

impl<S: Store + Clone> PaymentOrderCoordinator<S> {
    pub fn new(store: S) -> Self {
        let orders = OrderTransactionCoordinator::new(store.clone());
        Self { store, orders }
    }

    /// Provider confirmed the charge: payment → CAPTURED, order → PAID.
    pub async fn capture_payment_and_update_order(
        &self,
        payment_id: i64,
        order_id: i64,
        actor_id: i64,
    ) -> Result<PaymentOutcome, OrderError> {
        let mut tx = self.store.begin().await?;

        let order = tx
            .find_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound { order_id })?;
        // Fail fast before touching the payment.
        lifecycle::validate_transition(order.status, OrderStatus::Paid)?;

        let payment = self.payment_for_order(tx.as_mut(), payment_id, order_id).await?;

        let now = Utc::now();
        let captured = tx
            .update_payment(&PaymentUpdate::capture(payment_id, now))
            .await?;
        let paid = self
            .orders
            .apply_transition(tx.as_mut(), &order, OrderStatus::Paid)
            .await?;

        tx.append_audit(&AuditEntry {
            entity: AuditEntity::Payment,
            entity_id: payment.id,
            action: AuditAction::PaymentCaptured,
            actor_id: Some(actor_id),
            old: Some(json!({
                "payment_status": payment.status,
                "order_status": order.status,
            })),
            new: Some(json!({
                "payment_status": captured.status,
                "order_status": paid.status,
            })),
            ts_utc: now,
        })
        .await?;
        tx.commit().await?;

        info!(payment_id, order_id, "payment captured, order paid");
        Ok(PaymentOutcome {
            payment: captured,
            order: paid,
        })
    }

    /// Provider reported the charge failed: payment → FAILED, order →
    /// CANCELLED, in one unit. `reason` is recorded in the audit entry.
    pub async fn handle_payment_failure(
        &self,
        payment_id: i64,
        order_id: i64,
        actor_id: i64,
        reason: Option<&str>,
    ) -> Result<PaymentOutcome, OrderError> {
        let mut tx = self.store.begin().await?;

        let order = tx
            .find_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound { order_id })?;
        lifecycle::validate_transition(order.status, OrderStatus::Cancelled)?;

        let payment = self.payment_for_order(tx.as_mut(), payment_id, order_id).await?;

        let now = Utc::now();
        let failed = tx
            .update_payment(&PaymentUpdate::fail(payment_id, now))
            .await?;
        let cancelled = self
            .orders
            .apply_transition(tx.as_mut(), &order, OrderStatus::Cancelled)
            .await?;

        tx.append_audit(&AuditEntry {
            entity: AuditEntity::Payment,
            entity_id: payment.id,
            action: AuditAction::PaymentFailed,
            actor_id: Some(actor_id),
            old: Some(json!({
                "payment_status": payment.status,
                "order_status": order.status,
            })),
            new: Some(json!({
                "payment_status": failed.status,
                "order_status": cancelled.status,
                "reason": reason,
            })),
            ts_utc: now,
        })
        .await?;
        tx.commit().await?;

        warn!(payment_id, order_id, reason, "payment failed, order cancelled");
        Ok(PaymentOutcome {
            payment: failed,
            order: cancelled,
        })
    }

    /// Refund the payment. A partial refund (`refund_amount` provided and
    /// below the captured amount) marks the payment PARTIALLY_REFUNDED and
    /// leaves the order alone; a full refund marks it REFUNDED and cancels
    /// the order through the lifecycle table.
    pub async fn refund_payment_and_update_order(
        &self,
        payment_id: i64,
        order_id: i64,
        actor_id: i64,
        refund_amount: Option<Decimal>,
    ) -> Result<RefundOutcome, OrderError> {
        let mut tx = self.store.begin().await?;

        let order = tx
            .find_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound { order_id })?;
        let payment = self.payment_for_order(tx.as_mut(), payment_id, order_id).await?;

        let is_partial = refund_amount.is_some_and(|amount| amount < payment.amount);
        let amount = refund_amount.unwrap_or(payment.amount);
        let now = Utc::now();

        if is_partial {
            let refunded = tx
                .update_payment(&PaymentUpdate::refund(
                    payment_id,
                    PaymentStatus::PartiallyRefunded,
                    amount,
                    now,
                ))
                .await?;
            tx.append_audit(&AuditEntry {
                entity: AuditEntity::Payment,
                entity_id: payment.id,
                action: AuditAction::PaymentRefunded,
                actor_id: Some(actor_id),
                old: Some(json!({ "payment_status": payment.status })),
                new: Some(json!({
                    "payment_status": refunded.status,
                    "refund_amount": amount,
                    "partial": true,
                })),
                ts_utc: now,
            })
            .await?;
            tx.commit().await?;

            info!(payment_id, order_id, %amount, "partial refund recorded");
            return Ok(RefundOutcome {
                payment: refunded,
                order: None,
            });
        }

        // Full refund also cancels the order; the transition must be legal
        // or the whole operation aborts with nothing persisted.
        lifecycle::validate_transition(order.status, OrderStatus::Cancelled)?;

        let refunded = tx
            .update_payment(&PaymentUpdate::refund(
                payment_id,
                PaymentStatus::Refunded,
                amount,
                now,
            ))
            .await?;
        let cancelled = self
            .orders
            .apply_transition(tx.as_mut(), &order, OrderStatus::Cancelled)
            .await?;

        tx.append_audit(&AuditEntry {
            entity: AuditEntity::Payment,
            entity_id: payment.id,
            action: AuditAction::PaymentRefunded,
            actor_id: Some(actor_id),
            old: Some(json!({
                "payment_status": payment.status,
                "order_status": order.status,
            })),
            new: Some(json!({
                "payment_status": refunded.status,
                "order_status": cancelled.status,
                "refund_amount": amount,
                "partial": false,
            })),
            ts_utc: now,
        })
        .await?;
        tx.commit().await?;

        info!(payment_id, order_id, %amount, "full refund, order cancelled");
        Ok(RefundOutcome {
            payment: refunded,
            order: Some(cancelled),
        })
    }

    /// Payment lookup scoped to the order being transitioned; a payment row
    /// tied to a different order is treated as absent.
    async fn payment_for_order(
        &self,
        tx: &mut dyn StoreTx,
        payment_id: i64,
        order_id: i64,
    ) -> Result<Payment, OrderError> {
        match tx.find_payment(payment_id).await? {
            Some(payment) if payment.order_id == order_id => Ok(payment),
            _ => Err(OrderError::PaymentNotFound { payment_id }),
        }
    }
}
