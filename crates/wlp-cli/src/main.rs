use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use wlp_db::PgStore;
use wlp_orders::{OrderTransactionCoordinator, PaymentOrderCoordinator};
use wlp_schemas::{DateRange, NewOrder, OrderKind, OrderStatus};

#[derive(Parser)]
#[command(name = "wlp")]
#[command(about = "Wearloop order core CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Catalog listings (minimal surface; the catalog service owns the rest)
    Item {
        #[command(subcommand)]
        cmd: ItemCmd,
    },

    /// Order lifecycle commands
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },

    /// Payment-driven transitions
    Payment {
        #[command(subcommand)]
        cmd: PaymentCmd,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> site)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses while any order is between
    /// approval and dispatch (a payment callback may land mid-migration)
    /// unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB with in-flight payments.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ItemCmd {
    /// Add a listing.
    Add {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        title: String,
    },
}

#[derive(Subcommand)]
enum OrderCmd {
    /// Create an order (RENT orders require --start and --end).
    Create {
        #[arg(long)]
        renter: i64,
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        item: i64,
        /// RENT | BUY | SWAP
        #[arg(long)]
        kind: String,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long = "idempotency-key")]
        idempotency_key: Option<String>,
    },

    /// Transition an order to a new status.
    Transition {
        #[arg(long)]
        order: i64,
        /// Target status (e.g. APPROVED, DISPATCHED)
        #[arg(long)]
        to: String,
        #[arg(long)]
        actor: i64,
        /// Optimistic concurrency: version the caller last read.
        #[arg(long = "expect-version")]
        expect_version: Option<i64>,
    },

    /// Print one order as JSON.
    Show {
        #[arg(long)]
        order: i64,
    },

    /// Probe whether a rental window is free.
    Availability {
        #[arg(long)]
        item: i64,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
}

#[derive(Subcommand)]
enum PaymentCmd {
    /// Record an authorized payment (the provider integration point).
    Authorize {
        #[arg(long)]
        order: i64,
        #[arg(long)]
        amount: Decimal,
    },

    /// Capture: payment -> CAPTURED, order -> PAID.
    Capture {
        #[arg(long)]
        payment: i64,
        #[arg(long)]
        order: i64,
        #[arg(long)]
        actor: i64,
    },

    /// Failure: payment -> FAILED, order -> CANCELLED.
    Fail {
        #[arg(long)]
        payment: i64,
        #[arg(long)]
        order: i64,
        #[arg(long)]
        actor: i64,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Refund. Partial (--amount below the captured amount) leaves the
    /// order untouched; full also cancels the order.
    Refund {
        #[arg(long)]
        payment: i64,
        #[arg(long)]
        order: i64,
        #[arg(long)]
        actor: i64,
        #[arg(long)]
        amount: Option<Decimal>,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Export all audit entries as hash-chained JSONL.
    Export {
        #[arg(long, default_value = "exports/audit.jsonl")]
        out: String,
    },

    /// Verify the hash chain of an exported audit log.
    Verify {
        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = wlp_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = wlp_db::status(&pool).await?;
                    println!("db_ok={} has_orders_table={}", s.ok, s.has_orders_table);
                }
                DbCmd::Migrate { yes } => {
                    let n = wlp_db::count_payment_pending_orders(&pool).await?;
                    if n > 0 && !yes {
                        anyhow::bail!(
                            "REFUSING MIGRATE: detected {} order(s) awaiting payment capture or dispatch. Re-run with: `wlp db migrate --yes`",
                            n
                        );
                    }

                    wlp_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Item { cmd } => {
            let pool = wlp_db::connect_from_env().await?;
            match cmd {
                ItemCmd::Add { owner, title } => {
                    let item = wlp_db::insert_item(&pool, owner, &title).await?;
                    println!("item_id={}", item.id);
                }
            }
        }

        Commands::Order { cmd } => {
            let pool = wlp_db::connect_from_env().await?;
            let orders = OrderTransactionCoordinator::new(PgStore::new(pool));
            match cmd {
                OrderCmd::Create {
                    renter,
                    owner,
                    item,
                    kind,
                    start,
                    end,
                    idempotency_key,
                } => {
                    let kind = OrderKind::parse(&kind)
                        .ok_or_else(|| anyhow!("invalid order kind: {kind}"))?;
                    let window = match (start, end) {
                        (Some(start), Some(end)) => Some(DateRange::new(start, end)),
                        (None, None) => None,
                        _ => anyhow::bail!("--start and --end must be given together"),
                    };
                    let order = orders
                        .create_order(
                            renter,
                            NewOrder {
                                renter_id: renter,
                                owner_id: owner,
                                item_id: item,
                                kind,
                                window,
                                idempotency_key,
                            },
                        )
                        .await?;
                    println!("order_id={} status={} version={}", order.id, order.status, order.version);
                }

                OrderCmd::Transition {
                    order,
                    to,
                    actor,
                    expect_version,
                } => {
                    let to = OrderStatus::parse(&to)
                        .ok_or_else(|| anyhow!("invalid order status: {to}"))?;
                    let updated = orders
                        .update_order_status(order, to, actor, expect_version)
                        .await?;
                    println!(
                        "order_id={} status={} previous={} version={}",
                        updated.id,
                        updated.status,
                        updated
                            .previous_status
                            .map(|s| s.as_str())
                            .unwrap_or("-"),
                        updated.version
                    );
                }

                OrderCmd::Show { order } => {
                    let order = orders.find_order(order).await?;
                    println!("{}", serde_json::to_string_pretty(&order)?);
                }

                OrderCmd::Availability { item, start, end } => {
                    let probe = orders
                        .check_availability(item, DateRange::new(start, end))
                        .await?;
                    match probe.conflicting_order_id {
                        Some(id) => println!("available=false conflicting_order={id}"),
                        None => println!("available=true"),
                    }
                }
            }
        }

        Commands::Payment { cmd } => {
            let pool = wlp_db::connect_from_env().await?;
            match cmd {
                PaymentCmd::Authorize { order, amount } => {
                    let payment = wlp_db::insert_authorized_payment(&pool, order, amount).await?;
                    println!("payment_id={} status={}", payment.id, payment.status);
                }

                PaymentCmd::Capture {
                    payment,
                    order,
                    actor,
                } => {
                    let payments = PaymentOrderCoordinator::new(PgStore::new(pool));
                    let outcome = payments
                        .capture_payment_and_update_order(payment, order, actor)
                        .await?;
                    println!(
                        "payment={} order={} order_version={}",
                        outcome.payment.status, outcome.order.status, outcome.order.version
                    );
                }

                PaymentCmd::Fail {
                    payment,
                    order,
                    actor,
                    reason,
                } => {
                    let payments = PaymentOrderCoordinator::new(PgStore::new(pool));
                    let outcome = payments
                        .handle_payment_failure(payment, order, actor, reason.as_deref())
                        .await?;
                    println!(
                        "payment={} order={} order_version={}",
                        outcome.payment.status, outcome.order.status, outcome.order.version
                    );
                }

                PaymentCmd::Refund {
                    payment,
                    order,
                    actor,
                    amount,
                } => {
                    let payments = PaymentOrderCoordinator::new(PgStore::new(pool));
                    let outcome = payments
                        .refund_payment_and_update_order(payment, order, actor, amount)
                        .await?;
                    match outcome.order {
                        Some(order) => println!(
                            "payment={} refund={} order={}",
                            outcome.payment.status,
                            outcome.payment.refund_amount.unwrap_or_default(),
                            order.status
                        ),
                        None => println!(
                            "payment={} refund={} order=untouched",
                            outcome.payment.status,
                            outcome.payment.refund_amount.unwrap_or_default()
                        ),
                    }
                }
            }
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Export { out } => {
                let pool = wlp_db::connect_from_env().await?;
                let entries = wlp_db::fetch_audit_entries(&pool).await?;
                let mut writer = wlp_audit::AuditWriter::new(&out, true)?;
                for entry in &entries {
                    writer.append(entry)?;
                }
                println!(
                    "exported={} path={} head_hash={}",
                    entries.len(),
                    out,
                    writer.last_hash().unwrap_or_else(|| "-".to_string())
                );
            }

            AuditCmd::Verify { path } => match wlp_audit::verify_hash_chain(&path)? {
                wlp_audit::VerifyResult::Valid { lines } => {
                    println!("chain=valid lines={lines}");
                }
                wlp_audit::VerifyResult::Broken { line, reason } => {
                    anyhow::bail!("chain=broken line={line} reason={reason}");
                }
            },
        },

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = wlp_config::load_layered_yaml(&path_refs)
                .context("config load failed")?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
