//! Order transaction coordinator — the single entry point for order
//! creation and status transitions.
//!
//! Every successful call leaves order data, version counter and audit trail
//! consistent, because every path runs inside one store transaction:
//!
//! ```text
//! create_order            update_order_status
//!     │                        │
//!     ├─ idempotency lookup    ├─ fetch order          → OrderNotFound
//!     ├─ item lookup           ├─ version guard        → VersionConflict
//!     ├─ window validation     ├─ state machine        → InvalidTransition
//!     ├─ conflict scan         ├─ CAS status write
//!     ├─ insert + audit        └─ audit + commit
//!     └─ commit
//! ```
//!
//! The version guard runs strictly before the state-machine check: a stale
//! caller should learn "refetch" rather than a transition verdict computed
//! against state they no longer hold.

use serde_json::json;
use tracing::{info, warn};
use wlp_schemas::{
    AuditAction, AuditEntity, AuditEntry, DateRange, NewOrder, Order, OrderKind, OrderStatus,
};

use crate::conflict;
use crate::error::OrderError;
use crate::lifecycle;
use crate::store::{StatusUpdate, Store, StoreTx};
use crate::version;

/// Availability probe result for a prospective rental window.
#[derive(Debug, Clone, PartialEq)]
pub struct Availability {
    pub available: bool,
    pub conflicting_order_id: Option<i64>,
}

pub struct OrderTransactionCoordinator<S> {
    store: S,
}

impl<S: Store> OrderTransactionCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create an order on behalf of `actor_id` (the requesting renter).
    ///
    /// RENT orders must carry a valid date window and must not overlap any
    /// committed booking of the same item; BUY/SWAP orders carry no window.
    /// Retries carrying the same idempotency key collapse onto the already
    /// created order instead of inserting a second row.
    pub async fn create_order(&self, actor_id: i64, new: NewOrder) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;

        if let Some(key) = new.idempotency_key.as_deref() {
            if let Some(existing) = tx.find_order_by_idempotency_key(key).await? {
                // Retried client request: nothing written, tx dropped.
                info!(
                    order_id = existing.id,
                    idempotency_key = key,
                    "order creation collapsed onto existing order"
                );
                return Ok(existing);
            }
        }

        if tx.find_active_item(new.item_id).await?.is_none() {
            return Err(OrderError::ItemNotFound {
                item_id: new.item_id,
            });
        }

        let new = match new.kind {
            OrderKind::Rent => {
                let window = new.window.ok_or_else(|| OrderError::InvalidDateRange {
                    detail: "rental order requires a date window".to_string(),
                })?;
                conflict::validate_window(&window)?;
                let existing = tx.rent_orders_for_item(new.item_id).await?;
                if let Some(blocking) = conflict::find_conflict(&window, &existing) {
                    warn!(
                        item_id = new.item_id,
                        conflicting_order_id = blocking.id,
                        "rental window rejected: double booking"
                    );
                    return Err(OrderError::DateConflict {
                        conflicting_order_id: blocking.id,
                    });
                }
                new
            }
            // Non-rental orders carry no booking window.
            OrderKind::Buy | OrderKind::Swap => NewOrder {
                window: None,
                ..new
            },
        };

        let order = tx.insert_order(&new).await?;
        tx.append_audit(&AuditEntry {
            entity: AuditEntity::Order,
            entity_id: order.id,
            action: AuditAction::Created,
            actor_id: Some(actor_id),
            old: None,
            new: Some(serde_json::to_value(&order).map_err(anyhow::Error::from)?),
            ts_utc: order.created_at,
        })
        .await?;
        tx.commit().await?;

        info!(
            order_id = order.id,
            item_id = order.item_id,
            kind = order.kind.as_str(),
            "order created"
        );
        Ok(order)
    }

    /// Transition an order to `new_status`.
    ///
    /// `expected_version`, when supplied, must equal the order's current
    /// version; the subsequent write is additionally conditioned on that
    /// same value, so of two racers starting from one version exactly one
    /// wins and the other observes `VersionConflict`.
    pub async fn update_order_status(
        &self,
        order_id: i64,
        new_status: OrderStatus,
        actor_id: i64,
        expected_version: Option<i64>,
    ) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;

        let order = tx
            .find_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound { order_id })?;

        version::check(order.version, expected_version)?;
        lifecycle::validate_transition(order.status, new_status)?;

        let updated = self
            .apply_transition(tx.as_mut(), &order, new_status)
            .await?;

        tx.append_audit(&AuditEntry {
            entity: AuditEntity::Order,
            entity_id: order.id,
            action: AuditAction::StatusChange,
            actor_id: Some(actor_id),
            old: Some(json!({ "status": order.status, "version": order.version })),
            new: Some(json!({ "status": updated.status, "version": updated.version })),
            ts_utc: updated.updated_at,
        })
        .await?;
        tx.commit().await?;

        info!(
            order_id,
            from = order.status.as_str(),
            to = updated.status.as_str(),
            version = updated.version,
            "order transitioned"
        );
        Ok(updated)
    }

    /// Read-only probe: would a RENT request for `window` on `item_id` be
    /// accepted right now? Same blocking-status filter and inclusive overlap
    /// rule as creation; no insert, so the answer can go stale the moment a
    /// concurrent booking commits.
    pub async fn check_availability(
        &self,
        item_id: i64,
        window: DateRange,
    ) -> Result<Availability, OrderError> {
        conflict::validate_window(&window)?;
        let mut tx = self.store.begin().await?;
        if tx.find_active_item(item_id).await?.is_none() {
            return Err(OrderError::ItemNotFound { item_id });
        }
        let existing = tx.rent_orders_for_item(item_id).await?;
        Ok(match conflict::find_conflict(&window, &existing) {
            Some(blocking) => Availability {
                available: false,
                conflicting_order_id: Some(blocking.id),
            },
            None => Availability {
                available: true,
                conflicting_order_id: None,
            },
        })
    }

    /// Pass-through read used by adapters and the CLI.
    pub async fn find_order(&self, order_id: i64) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;
        tx.find_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound { order_id })
    }

    /// CAS write shared with the payment coordinator: expects `order` to be
    /// the freshly read row of the current transaction.
    pub(crate) async fn apply_transition(
        &self,
        tx: &mut dyn StoreTx,
        order: &Order,
        new_status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let update = StatusUpdate {
            order_id: order.id,
            expect_version: order.version,
            new_status,
            previous_status: order.status,
        };
        match tx.update_order_status(&update).await? {
            Some(updated) => Ok(updated),
            // A racer won between our read and the conditional write. The
            // caller contract is the same as a read-side mismatch: refetch.
            None => {
                let actual = tx
                    .find_order(order.id)
                    .await?
                    .map(|o| o.version)
                    .unwrap_or(order.version);
                Err(OrderError::VersionConflict {
                    expected: order.version,
                    actual,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::MemStore;
    use crate::testutil::{day, item, rent_request};
    use wlp_schemas::AuditAction;

    fn coordinator(store: &MemStore) -> OrderTransactionCoordinator<MemStore> {
        OrderTransactionCoordinator::new(store.clone())
    }

    #[tokio::test]
    async fn create_order_starts_requested_at_version_zero() {
        let store = MemStore::new();
        store.seed_item(item(7, 20)).await;
        let orders = coordinator(&store);

        let order = orders
            .create_order(10, rent_request(7, day(2026, 6, 10), day(2026, 6, 15)))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Requested);
        assert_eq!(order.version, 0);
        assert_eq!(order.previous_status, None);
        // Creation and its audit entry commit together.
        let audit = store.audit_entries().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Created);
        assert_eq!(audit[0].entity_id, order.id);
    }

    #[tokio::test]
    async fn create_order_rejects_missing_item() {
        let store = MemStore::new();
        let orders = coordinator(&store);
        let err = orders
            .create_order(10, rent_request(99, day(2026, 6, 10), day(2026, 6, 15)))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ItemNotFound { item_id: 99 }));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn delisted_item_reads_as_missing() {
        let store = MemStore::new();
        let mut listing = item(7, 20);
        listing.deleted_at = Some(chrono::Utc::now());
        store.seed_item(listing).await;

        let orders = coordinator(&store);
        let err = orders
            .create_order(10, rent_request(7, day(2026, 6, 10), day(2026, 6, 15)))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ItemNotFound { item_id: 7 }));
    }

    #[tokio::test]
    async fn soft_deleted_order_reads_as_missing() {
        let store = MemStore::new();
        store.seed_item(item(7, 20)).await;
        let orders = coordinator(&store);

        let order = orders
            .create_order(10, rent_request(7, day(2026, 6, 10), day(2026, 6, 15)))
            .await
            .unwrap();

        let mut row = store.order(order.id).await.unwrap();
        row.deleted_at = Some(chrono::Utc::now());
        store.seed_order(row).await;

        let err = orders
            .update_order_status(order.id, OrderStatus::Approved, 20, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound { .. }));
    }

    #[tokio::test]
    async fn create_rent_order_without_window_is_rejected() {
        let store = MemStore::new();
        store.seed_item(item(7, 20)).await;
        let orders = coordinator(&store);
        let mut req = rent_request(7, day(2026, 6, 10), day(2026, 6, 15));
        req.window = None;
        let err = orders.create_order(10, req).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidDateRange { .. }));
    }

    #[tokio::test]
    async fn buy_order_ignores_window_and_conflicts() {
        let store = MemStore::new();
        store.seed_item(item(7, 20)).await;
        let orders = coordinator(&store);

        // Committed rental occupying the calendar.
        let booked = orders
            .create_order(10, rent_request(7, day(2026, 6, 10), day(2026, 6, 15)))
            .await
            .unwrap();
        orders
            .update_order_status(booked.id, OrderStatus::Approved, 20, None)
            .await
            .unwrap();

        // A BUY order for the same item is not calendar-gated.
        let mut req = rent_request(7, day(2026, 6, 10), day(2026, 6, 15));
        req.kind = OrderKind::Buy;
        let order = orders.create_order(11, req).await.unwrap();
        assert_eq!(order.window, None);
    }

    #[tokio::test]
    async fn idempotency_key_collapses_retries() {
        let store = MemStore::new();
        store.seed_item(item(7, 20)).await;
        let orders = coordinator(&store);

        let mut req = rent_request(7, day(2026, 6, 10), day(2026, 6, 15));
        req.idempotency_key = Some("client-retry-1".to_string());

        let first = orders.create_order(10, req.clone()).await.unwrap();
        let second = orders.create_order(10, req).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.order_count().await, 1);
        // The retry wrote nothing, including audit.
        assert_eq!(store.audit_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn overlapping_committed_booking_blocks_creation() {
        let store = MemStore::new();
        store.seed_item(item(7, 20)).await;
        let orders = coordinator(&store);

        let booked = orders
            .create_order(10, rent_request(7, day(2026, 6, 10), day(2026, 6, 15)))
            .await
            .unwrap();
        orders
            .update_order_status(booked.id, OrderStatus::Approved, 20, None)
            .await
            .unwrap();

        // Shared boundary day conflicts.
        let err = orders
            .create_order(11, rent_request(7, day(2026, 6, 15), day(2026, 6, 20)))
            .await
            .unwrap_err();
        match err {
            OrderError::DateConflict {
                conflicting_order_id,
            } => assert_eq!(conflicting_order_id, booked.id),
            other => panic!("expected DateConflict, got {other}"),
        }

        // Day after the boundary is free.
        assert!(orders
            .create_order(11, rent_request(7, day(2026, 6, 16), day(2026, 6, 20)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn requested_booking_does_not_block_creation() {
        let store = MemStore::new();
        store.seed_item(item(7, 20)).await;
        let orders = coordinator(&store);

        // Still REQUESTED: owner has not approved, calendar not occupied.
        orders
            .create_order(10, rent_request(7, day(2026, 6, 10), day(2026, 6, 15)))
            .await
            .unwrap();
        assert!(orders
            .create_order(11, rent_request(7, day(2026, 6, 12), day(2026, 6, 14)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn update_status_walks_the_lifecycle_and_bumps_version() {
        let store = MemStore::new();
        store.seed_item(item(7, 20)).await;
        let orders = coordinator(&store);

        let order = orders
            .create_order(10, rent_request(7, day(2026, 6, 10), day(2026, 6, 15)))
            .await
            .unwrap();
        let approved = orders
            .update_order_status(order.id, OrderStatus::Approved, 20, Some(0))
            .await
            .unwrap();
        assert_eq!(approved.status, OrderStatus::Approved);
        assert_eq!(approved.previous_status, Some(OrderStatus::Requested));
        assert_eq!(approved.version, 1);

        let audit = store.audit_entries().await;
        assert_eq!(audit.last().unwrap().action, AuditAction::StatusChange);
    }

    #[tokio::test]
    async fn stale_expected_version_is_reported_before_transition_check() {
        let store = MemStore::new();
        store.seed_item(item(7, 20)).await;
        let orders = coordinator(&store);

        let order = orders
            .create_order(10, rent_request(7, day(2026, 6, 10), day(2026, 6, 15)))
            .await
            .unwrap();
        orders
            .update_order_status(order.id, OrderStatus::Approved, 20, None)
            .await
            .unwrap();

        // Stale version AND illegal target: the version error must win.
        let err = orders
            .update_order_status(order.id, OrderStatus::Delivered, 20, Some(0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::VersionConflict {
                expected: 0,
                actual: 1
            }
        ));

        // Order untouched by the failed call.
        let current = orders.find_order(order.id).await.unwrap();
        assert_eq!(current.status, OrderStatus::Approved);
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_with_allowed_list() {
        let store = MemStore::new();
        store.seed_item(item(7, 20)).await;
        let orders = coordinator(&store);

        let order = orders
            .create_order(10, rent_request(7, day(2026, 6, 10), day(2026, 6, 15)))
            .await
            .unwrap();
        let err = orders
            .update_order_status(order.id, OrderStatus::Dispatched, 20, None)
            .await
            .unwrap_err();
        match err {
            OrderError::InvalidTransition { from, to, allowed } => {
                assert_eq!(from, OrderStatus::Requested);
                assert_eq!(to, OrderStatus::Dispatched);
                assert_eq!(allowed, &[OrderStatus::Approved, OrderStatus::Cancelled]);
            }
            other => panic!("expected InvalidTransition, got {other}"),
        }
    }

    #[tokio::test]
    async fn availability_probe_reports_conflicts_without_writing() {
        let store = MemStore::new();
        store.seed_item(item(7, 20)).await;
        let orders = coordinator(&store);

        let booked = orders
            .create_order(10, rent_request(7, day(2026, 6, 10), day(2026, 6, 15)))
            .await
            .unwrap();
        orders
            .update_order_status(booked.id, OrderStatus::Approved, 20, None)
            .await
            .unwrap();

        let hit = orders
            .check_availability(7, DateRange::new(day(2026, 6, 14), day(2026, 6, 18)))
            .await
            .unwrap();
        assert!(!hit.available);
        assert_eq!(hit.conflicting_order_id, Some(booked.id));

        let free = orders
            .check_availability(7, DateRange::new(day(2026, 7, 1), day(2026, 7, 4)))
            .await
            .unwrap();
        assert!(free.available);
        assert_eq!(store.order_count().await, 1);
    }
}
