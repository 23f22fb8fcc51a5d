//! Anti-double-booking conflict detection.
//!
//! A physical garment cannot be in two places at once, including on the
//! handover day, so the overlap test is inclusive at both bounds: an
//! existing booking ending Jun 15 conflicts with a new one starting Jun 15.
//!
//! Only committed bookings occupy the calendar. REQUESTED orders have not
//! been approved by the owner yet and do not block; CANCELLED, RETURNED and
//! COMPLETED orders no longer hold future days.

use wlp_schemas::{DateRange, Order, OrderKind, OrderStatus};

use crate::error::OrderError;

/// Statuses that occupy the rental calendar.
pub const CALENDAR_BLOCKING: &[OrderStatus] = &[
    OrderStatus::Approved,
    OrderStatus::Paid,
    OrderStatus::Dispatched,
    OrderStatus::Delivered,
];

/// Whether an order in `status` blocks other bookings of the same item.
pub fn occupies_calendar(status: OrderStatus) -> bool {
    CALENDAR_BLOCKING.contains(&status)
}

/// Inclusive-bounds overlap: `[s1,e1]` and `[s2,e2]` overlap iff
/// `s1 <= e2 && e1 >= s2`. A shared boundary day counts as overlap.
pub fn windows_overlap(a: &DateRange, b: &DateRange) -> bool {
    a.start <= b.end && a.end >= b.start
}

/// Reject windows whose start is after their end.
pub fn validate_window(window: &DateRange) -> Result<(), OrderError> {
    if window.start > window.end {
        return Err(OrderError::InvalidDateRange {
            detail: format!("start {} is after end {}", window.start, window.end),
        });
    }
    Ok(())
}

/// Scan `existing` (the item's non-deleted RENT orders) for a booking that
/// blocks `window`. Returns the first conflicting order, scan order being
/// whatever the store returned.
///
/// The caller must run this inside the same unit of work as the insert it
/// gates; the check alone does not close the concurrent-creation race.
pub fn find_conflict<'a>(window: &DateRange, existing: &'a [Order]) -> Option<&'a Order> {
    existing.iter().find(|order| {
        order.kind == OrderKind::Rent
            && order.deleted_at.is_none()
            && occupies_calendar(order.status)
            && order
                .window
                .as_ref()
                .is_some_and(|w| windows_overlap(window, w))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use chrono::Utc;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn range(start: NaiveDate, end: NaiveDate) -> DateRange {
        DateRange::new(start, end)
    }

    fn rent_order(id: i64, status: OrderStatus, window: DateRange) -> Order {
        let now = Utc::now();
        Order {
            id,
            renter_id: 10,
            owner_id: 20,
            item_id: 7,
            kind: OrderKind::Rent,
            status,
            previous_status: None,
            version: 0,
            window: Some(window),
            idempotency_key: None,
            deleted_at: None,
            has_active_dispute: false,
            dispute_count: 0,
            dispute_locked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn shared_boundary_day_is_a_conflict() {
        let existing = range(day(2026, 6, 10), day(2026, 6, 15));
        assert!(windows_overlap(
            &range(day(2026, 6, 15), day(2026, 6, 20)),
            &existing
        ));
        assert!(!windows_overlap(
            &range(day(2026, 6, 16), day(2026, 6, 20)),
            &existing
        ));
    }

    #[test]
    fn containment_and_identical_windows_overlap() {
        let outer = range(day(2026, 6, 1), day(2026, 6, 30));
        let inner = range(day(2026, 6, 10), day(2026, 6, 12));
        assert!(windows_overlap(&inner, &outer));
        assert!(windows_overlap(&outer, &inner));
        assert!(windows_overlap(&inner, &inner));
    }

    #[test]
    fn start_after_end_is_rejected() {
        let err = validate_window(&range(day(2026, 6, 20), day(2026, 6, 10))).unwrap_err();
        assert!(matches!(err, OrderError::InvalidDateRange { .. }));
        assert!(validate_window(&range(day(2026, 6, 10), day(2026, 6, 10))).is_ok());
    }

    #[test]
    fn requested_and_cancelled_orders_do_not_block() {
        let window = range(day(2026, 6, 10), day(2026, 6, 15));
        let existing = vec![
            rent_order(1, OrderStatus::Requested, window),
            rent_order(2, OrderStatus::Cancelled, window),
            rent_order(3, OrderStatus::Completed, window),
            rent_order(4, OrderStatus::Returned, window),
        ];
        assert!(find_conflict(&window, &existing).is_none());
    }

    #[test]
    fn committed_statuses_block() {
        let window = range(day(2026, 6, 10), day(2026, 6, 15));
        for status in CALENDAR_BLOCKING {
            let existing = vec![rent_order(9, *status, window)];
            let hit = find_conflict(&range(day(2026, 6, 15), day(2026, 6, 20)), &existing);
            assert_eq!(hit.map(|o| o.id), Some(9), "status {status} must block");
        }
    }

    #[test]
    fn soft_deleted_orders_do_not_block() {
        let window = range(day(2026, 6, 10), day(2026, 6, 15));
        let mut order = rent_order(5, OrderStatus::Approved, window);
        order.deleted_at = Some(Utc::now());
        assert!(find_conflict(&window, &[order]).is_none());
    }

    #[test]
    fn first_conflicting_order_is_reported() {
        let window = range(day(2026, 6, 10), day(2026, 6, 15));
        let existing = vec![
            rent_order(1, OrderStatus::Requested, window),
            rent_order(2, OrderStatus::Approved, window),
            rent_order(3, OrderStatus::Paid, window),
        ];
        assert_eq!(find_conflict(&window, &existing).map(|o| o.id), Some(2));
    }
}
