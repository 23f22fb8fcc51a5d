//! Test harness for the order core: an in-memory marketplace with both
//! coordinators wired up, plus re-exported fixture builders.
//!
//! Integration tests drive full lifecycles through the public coordinator
//! operations only — exactly the paths production adapters use — and then
//! assert on the store directly.

pub mod driver;

pub use driver::{LifecycleDriver, RentalRun};
pub use wlp_orders::memstore::MemStore;
pub use wlp_orders::testutil::{
    authorized_payment, day, item, order_in, rent_request, rent_window,
};
