//! Wearloop order lifecycle and payment-consistency core.
//!
//! Two coordinators own every mutation of order and payment rows:
//! [`OrderTransactionCoordinator`] for creation and status transitions,
//! [`PaymentOrderCoordinator`] for the payment-driven transitions (capture,
//! failure, refund). Both run each operation inside one [`store::StoreTx`]
//! and validate every status change against the pure lifecycle table in
//! [`lifecycle::state_machine`].
//!
//! The `testkit` feature exposes the in-memory store and fixture builders;
//! it must not be enabled by production binaries.

pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod payment;
pub mod store;
pub mod version;

#[cfg(any(test, feature = "testkit"))]
pub mod memstore;
#[cfg(any(test, feature = "testkit"))]
pub mod testutil;

pub use coordinator::{Availability, OrderTransactionCoordinator};
pub use error::OrderError;
pub use payment::{PaymentOrderCoordinator, PaymentOutcome, RefundOutcome};
pub use store::{PaymentUpdate, StatusUpdate, Store, StoreTx};
