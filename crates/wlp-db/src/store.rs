//! Transactional store implementation over sqlx/Postgres.
//!
//! One [`PgTx`] wraps one Postgres transaction. The two race-closers the
//! store contract requires map onto SQL as follows:
//!
//! - **Creation race**: `find_active_item` takes `FOR UPDATE` on the item
//!   row, so two creations for the same item serialize at the item lock and
//!   the second one's conflict scan sees the first one's insert.
//! - **Update race**: `update_order_status` is a single conditional UPDATE
//!   (`WHERE … AND version = $expect`); zero rows touched means a racer won
//!   and the caller reports a version conflict.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use wlp_orders::error::OrderError;
use wlp_orders::store::{PaymentUpdate, StatusUpdate, Store, StoreTx};
use wlp_schemas::{AuditEntry, ItemSnapshot, NewOrder, Order, OrderStatus, Payment};

use crate::rows;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, OrderError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| anyhow::Error::new(e).context("begin transaction failed"))?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn find_active_item(&mut self, item_id: i64) -> Result<Option<ItemSnapshot>, OrderError> {
        // FOR UPDATE: the item row is the serialization point for all
        // bookings of this item within the transaction's lifetime.
        let row = sqlx::query(
            r#"
            select id, owner_id, title, deleted_at
            from items
            where id = $1 and deleted_at is null
            for update
            "#,
        )
        .bind(item_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| anyhow::Error::new(e).context("find_active_item failed"))?;

        row.map(|row| -> Result<ItemSnapshot, anyhow::Error> {
            Ok(ItemSnapshot {
                id: row.try_get("id")?,
                owner_id: row.try_get("owner_id")?,
                title: row.try_get("title")?,
                deleted_at: row.try_get("deleted_at")?,
            })
        })
        .transpose()
        .map_err(OrderError::from)
    }

    async fn find_order(&mut self, order_id: i64) -> Result<Option<Order>, OrderError> {
        let row = sqlx::query(
            r#"
            select * from orders
            where id = $1 and deleted_at is null
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| anyhow::Error::new(e).context("find_order failed"))?;

        row.as_ref()
            .map(rows::order_from_row)
            .transpose()
            .map_err(OrderError::from)
    }

    async fn find_order_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<Order>, OrderError> {
        let row = sqlx::query(
            r#"
            select * from orders
            where idempotency_key = $1 and deleted_at is null
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| anyhow::Error::new(e).context("find_order_by_idempotency_key failed"))?;

        row.as_ref()
            .map(rows::order_from_row)
            .transpose()
            .map_err(OrderError::from)
    }

    async fn rent_orders_for_item(&mut self, item_id: i64) -> Result<Vec<Order>, OrderError> {
        let rows = sqlx::query(
            r#"
            select * from orders
            where item_id = $1 and kind = 'RENT' and deleted_at is null
            "#,
        )
        .bind(item_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| anyhow::Error::new(e).context("rent_orders_for_item failed"))?;

        rows.iter()
            .map(rows::order_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(OrderError::from)
    }

    async fn insert_order(&mut self, new: &NewOrder) -> Result<Order, OrderError> {
        // The partial unique index on idempotency_key backstops the
        // coordinator's lookup: a same-key race surfaces as a constraint
        // error here instead of a duplicate row.
        let row = sqlx::query(
            r#"
            insert into orders (
              renter_id, owner_id, item_id, kind, status, version,
              start_date, end_date, idempotency_key
            ) values (
              $1, $2, $3, $4, $5, 0, $6, $7, $8
            )
            returning *
            "#,
        )
        .bind(new.renter_id)
        .bind(new.owner_id)
        .bind(new.item_id)
        .bind(new.kind.as_str())
        .bind(OrderStatus::Requested.as_str())
        .bind(new.window.map(|w| w.start))
        .bind(new.window.map(|w| w.end))
        .bind(new.idempotency_key.as_deref())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if crate::is_unique_constraint_violation(&e, "uq_orders_idempotency_key") {
                anyhow::Error::new(e).context("idempotency key already in use")
            } else {
                anyhow::Error::new(e).context("insert_order failed")
            }
        })?;

        rows::order_from_row(&row).map_err(OrderError::from)
    }

    async fn update_order_status(
        &mut self,
        update: &StatusUpdate,
    ) -> Result<Option<Order>, OrderError> {
        let row = sqlx::query(
            r#"
            update orders
            set status = $2,
                previous_status = $3,
                version = version + 1,
                updated_at = now()
            where id = $1 and version = $4 and deleted_at is null
            returning *
            "#,
        )
        .bind(update.order_id)
        .bind(update.new_status.as_str())
        .bind(update.previous_status.as_str())
        .bind(update.expect_version)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| anyhow::Error::new(e).context("update_order_status failed"))?;

        row.as_ref()
            .map(rows::order_from_row)
            .transpose()
            .map_err(OrderError::from)
    }

    async fn find_payment(&mut self, payment_id: i64) -> Result<Option<Payment>, OrderError> {
        let row = sqlx::query(
            r#"
            select id, order_id, status, amount, refund_amount,
                   captured_at, failed_at, refunded_at, created_at
            from payments
            where id = $1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| anyhow::Error::new(e).context("find_payment failed"))?;

        row.as_ref()
            .map(rows::payment_from_row)
            .transpose()
            .map_err(OrderError::from)
    }

    async fn update_payment(&mut self, update: &PaymentUpdate) -> Result<Payment, OrderError> {
        let row = sqlx::query(
            r#"
            update payments
            set status = $2,
                refund_amount = coalesce($3, refund_amount),
                captured_at = coalesce($4, captured_at),
                failed_at = coalesce($5, failed_at),
                refunded_at = coalesce($6, refunded_at)
            where id = $1
            returning id, order_id, status, amount, refund_amount,
                      captured_at, failed_at, refunded_at, created_at
            "#,
        )
        .bind(update.payment_id)
        .bind(update.status.as_str())
        .bind(update.refund_amount)
        .bind(update.captured_at)
        .bind(update.failed_at)
        .bind(update.refunded_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| anyhow::Error::new(e).context("update_payment failed"))?;

        match row {
            Some(row) => rows::payment_from_row(&row).map_err(OrderError::from),
            None => Err(OrderError::PaymentNotFound {
                payment_id: update.payment_id,
            }),
        }
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), OrderError> {
        sqlx::query(
            r#"
            insert into audit_events (
              entity, entity_id, action, actor_id, old_value, new_value, ts_utc
            ) values (
              $1, $2, $3, $4, $5, $6, $7
            )
            "#,
        )
        .bind(entry.entity.as_str())
        .bind(entry.entity_id)
        .bind(entry.action.as_str())
        .bind(entry.actor_id)
        .bind(entry.old.clone())
        .bind(entry.new.clone())
        .bind(entry.ts_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| anyhow::Error::new(e).context("append_audit failed"))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), OrderError> {
        self.tx
            .commit()
            .await
            .map_err(|e| anyhow::Error::new(e).context("commit failed"))?;
        Ok(())
    }
}
