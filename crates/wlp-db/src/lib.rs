//! PostgreSQL backing store for the order core.
//!
//! Pool plumbing, migrations and operator helpers live here; the
//! transactional [`store::PgStore`] implements the `wlp-orders` store
//! traits.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use wlp_schemas::{AuditAction, AuditEntity, AuditEntry, ItemSnapshot, Payment, PaymentStatus};

mod rows;
pub mod store;

pub use store::PgStore;

pub const ENV_DB_URL: &str = "WLP_DATABASE_URL";

/// Connect to Postgres using WLP_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_orders_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

/// Count live orders sitting between approval and dispatch — the window
/// where a payment callback may land at any moment. CLI guardrails use this
/// to refuse accidental migration of a busy production DB.
pub async fn count_payment_pending_orders(pool: &PgPool) -> Result<i64> {
    // If the schema doesn't exist yet, treat as 0 (safe) rather than failing.
    let st = status(pool).await?;
    if !st.has_orders_table {
        return Ok(0);
    }

    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from orders
        where deleted_at is null
          and status in ('APPROVED','PAID')
        "#,
    )
    .fetch_one(pool)
    .await
    .context("count_payment_pending_orders failed")?;

    Ok(n)
}

/// Convenience boolean.
pub async fn has_payment_pending_orders(pool: &PgPool) -> Result<bool> {
    Ok(count_payment_pending_orders(pool).await? > 0)
}

/// Insert a catalog listing. The full catalog subsystem lives elsewhere;
/// this is the minimal surface the order core and its tooling need.
pub async fn insert_item(pool: &PgPool, owner_id: i64, title: &str) -> Result<ItemSnapshot> {
    let row = sqlx::query(
        r#"
        insert into items (owner_id, title)
        values ($1, $2)
        returning id, owner_id, title, deleted_at
        "#,
    )
    .bind(owner_id)
    .bind(title)
    .fetch_one(pool)
    .await
    .context("insert_item failed")?;

    Ok(ItemSnapshot {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Record an authorized payment against an order. This is the payment
/// provider's integration point; the coordinators only ever transition
/// payments that already exist.
pub async fn insert_authorized_payment(
    pool: &PgPool,
    order_id: i64,
    amount: Decimal,
) -> Result<Payment> {
    let row = sqlx::query(
        r#"
        insert into payments (order_id, status, amount)
        values ($1, $2, $3)
        returning id, order_id, status, amount, refund_amount,
                  captured_at, failed_at, refunded_at, created_at
        "#,
    )
    .bind(order_id)
    .bind(PaymentStatus::Authorized.as_str())
    .bind(amount)
    .fetch_one(pool)
    .await
    .context("insert_authorized_payment failed")?;

    rows::payment_from_row(&row)
}

/// All audit entries in write order, for export and chain building.
pub async fn fetch_audit_entries(pool: &PgPool) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        r#"
        select entity, entity_id, action, actor_id, old_value, new_value, ts_utc
        from audit_events
        order by id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("fetch_audit_entries failed")?;

    rows.iter()
        .map(|row| {
            let entity_s: String = row.try_get("entity")?;
            let action_s: String = row.try_get("action")?;
            Ok(AuditEntry {
                entity: AuditEntity::parse(&entity_s)
                    .ok_or_else(|| anyhow!("invalid audit entity: {entity_s}"))?,
                entity_id: row.try_get("entity_id")?,
                action: AuditAction::parse(&action_s)
                    .ok_or_else(|| anyhow!("invalid audit action: {action_s}"))?,
                actor_id: row.try_get("actor_id")?,
                old: row.try_get("old_value")?,
                new: row.try_get("new_value")?,
                ts_utc: row.try_get::<DateTime<Utc>, _>("ts_utc")?,
            })
        })
        .collect()
}

/// Detect a Postgres unique constraint violation by name.
pub fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.constraint() == Some(constraint)
                || db_err.code().as_deref() == Some("23505")
                    && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
