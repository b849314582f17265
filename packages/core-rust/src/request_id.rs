//! Request identifiers and the allocator that hands them out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier of one dispatched request. Unique for the lifetime of the
/// allocator that produced it; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Returns the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returned once the `u64` id space is used up. The allocator never wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request id space exhausted")]
pub struct AllocatorExhausted;

/// Lock-free, strictly increasing request id source.
///
/// Shared across threads behind an `Arc`; `next()` is a single atomic
/// read-modify-write, so concurrent callers never observe the same value.
#[derive(Debug)]
pub struct RequestIdAllocator {
    next: AtomicU64,
}

impl RequestIdAllocator {
    /// Creates an allocator whose first id is 1 (0 is reserved as "no request").
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates an allocator whose first id is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocates the next id.
    ///
    /// # Errors
    ///
    /// Returns `AllocatorExhausted` once the counter reaches `u64::MAX`.
    pub fn next(&self) -> Result<RequestId, AllocatorExhausted> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_add(1)
            })
            .map(RequestId)
            .map_err(|_| AllocatorExhausted)
    }

    /// Returns the id the next call to `next()` would hand out, without
    /// consuming it.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
