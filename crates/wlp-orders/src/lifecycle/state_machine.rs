//! Order status state machine.
//!
//! # Design
//!
//! Pure transition table for the order lifecycle. No I/O, no hidden state;
//! safe to call concurrently from any number of tasks. Every status mutation
//! in the workspace funnels through [`validate_transition`] — the
//! coordinators never write a status this table does not allow.
//!
//! # State diagram
//!
//! ```text
//!  new ──► REQUESTED ──► APPROVED ──► PAID ──► DISPATCHED ──► DELIVERED
//!              │             │          │           │           │     │
//!              ▼             ▼          ▼           ▼           │     ▼
//!          CANCELLED     CANCELLED  CANCELLED   CANCELLED       │  COMPLETED (term.)
//!          (term.)                                              ▼
//!                                                      RETURN_REQUESTED
//!                                                               │
//!                                                               ▼
//!                                                           RETURNED ──► COMPLETED
//! ```
//!
//! Once an item is out with the renter (DELIVERED), the order can no longer
//! be cancelled — it either completes directly (BUY/SWAP, or a rental kept
//! past return) or walks the return leg.

use wlp_schemas::OrderStatus;

use crate::error::OrderError;

/// Allowed target statuses for `from`. Empty for terminal states.
///
/// The table is plain `match` data: no runtime construction, no
/// initialization order to get wrong, and the returned slices are `'static`
/// so errors can carry them without cloning.
pub fn valid_next_states(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Requested => &[Approved, Cancelled],
        Approved => &[Paid, Cancelled],
        Paid => &[Dispatched, Cancelled],
        Dispatched => &[Delivered, Cancelled],
        Delivered => &[ReturnRequested, Completed],
        ReturnRequested => &[Returned],
        Returned => &[Completed],
        Completed | Cancelled => &[],
    }
}

/// Whether `from → to` is a legal transition. Self-loops are never legal.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    valid_next_states(from).contains(&to)
}

/// Whether no further transitions are possible from `status`.
pub fn is_terminal(status: OrderStatus) -> bool {
    valid_next_states(status).is_empty()
}

/// Validate `from → to`, failing with [`OrderError::InvalidTransition`]
/// carrying the full allowed list so callers can render an actionable
/// message.
pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(OrderError::InvalidTransition {
            from,
            to,
            allowed: valid_next_states(from),
        })
    }
}
