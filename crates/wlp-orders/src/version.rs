//! Optimistic version guard.
//!
//! Status-mutating calls optionally carry the version the caller last read.
//! A mismatch means the caller is holding stale state and must refetch; it
//! is checked before any other validation so a stale caller gets the version
//! error rather than a transition error computed against data they no longer
//! hold.
//!
//! The guard is only half the contract: the store's status update must also
//! condition its write on the same version value (compare-and-set), so a
//! racer that slips past this read-side check still loses at write time.

use crate::error::OrderError;

/// Compare `expected` (caller-supplied, optional) against `actual` (the
/// current row). `None` bypasses the guard — callers that don't care about
/// races opt out.
pub fn check(actual: i64, expected: Option<i64>) -> Result<(), OrderError> {
    match expected {
        Some(expected) if expected != actual => {
            Err(OrderError::VersionConflict { expected, actual })
        }
        _ => Ok(()),
    }
}
