//! Error taxonomy of the order core.
//!
//! Every variant except `Store` is an expected, recoverable-by-caller
//! condition. Nothing here is retried internally and nothing is swallowed:
//! each error is raised synchronously by the operation that detects it,
//! before any effect of that operation becomes visible.

use wlp_schemas::OrderStatus;

#[derive(Debug)]
pub enum OrderError {
    /// Referenced item is missing or soft-deleted.
    ItemNotFound { item_id: i64 },
    /// Requested rental window overlaps an existing calendar commitment.
    DateConflict { conflicting_order_id: i64 },
    /// The rental window is malformed (start after end, or absent on a RENT
    /// order).
    InvalidDateRange { detail: String },
    /// Referenced order is missing or soft-deleted.
    OrderNotFound { order_id: i64 },
    /// Referenced payment is missing, or not tied to the given order.
    PaymentNotFound { payment_id: i64 },
    /// The caller's `expected_version` no longer matches; refetch and retry.
    VersionConflict { expected: i64, actual: i64 },
    /// Illegal lifecycle transition. Carries the full allowed list for
    /// `from` so callers can render an actionable message. Not retryable —
    /// this indicates a logic error upstream.
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
        allowed: &'static [OrderStatus],
    },
    /// Backing-store failure, surfaced verbatim.
    Store(anyhow::Error),
}

impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderError::ItemNotFound { item_id } => {
                write!(f, "item {item_id} not found or no longer listed")
            }
            OrderError::DateConflict {
                conflicting_order_id,
            } => {
                write!(
                    f,
                    "requested window conflicts with existing booking (order {conflicting_order_id})"
                )
            }
            OrderError::InvalidDateRange { detail } => {
                write!(f, "invalid rental window: {detail}")
            }
            OrderError::OrderNotFound { order_id } => {
                write!(f, "order {order_id} not found")
            }
            OrderError::PaymentNotFound { payment_id } => {
                write!(f, "payment {payment_id} not found")
            }
            OrderError::VersionConflict { expected, actual } => {
                write!(
                    f,
                    "version conflict: expected {expected}, actual {actual}; refetch and retry"
                )
            }
            OrderError::InvalidTransition { from, to, allowed } => {
                let allowed: Vec<&str> = allowed.iter().map(|s| s.as_str()).collect();
                write!(
                    f,
                    "illegal transition {from} -> {to}; allowed from {from}: [{}]",
                    allowed.join(", ")
                )
            }
            OrderError::Store(err) => write!(f, "store error: {err}"),
        }
    }
}

impl std::error::Error for OrderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OrderError::Store(err) => err.source(),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for OrderError {
    fn from(err: anyhow::Error) -> Self {
        OrderError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message_lists_alternatives() {
        let err = OrderError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Paid,
            allowed: &[OrderStatus::ReturnRequested, OrderStatus::Completed],
        };
        let msg = err.to_string();
        assert!(msg.contains("DELIVERED -> PAID"));
        assert!(msg.contains("RETURN_REQUESTED"));
        assert!(msg.contains("COMPLETED"));
    }

    #[test]
    fn version_conflict_message_tells_caller_to_refetch() {
        let err = OrderError::VersionConflict {
            expected: 1,
            actual: 2,
        };
        assert!(err.to_string().contains("refetch"));
    }
}
