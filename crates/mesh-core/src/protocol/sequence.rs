//! Thread-safe request-id allocator.
//!
//! # Why a counter? (for beginners)
//!
//! A single connection carries many requests at once, and replies may come
//! back in any order.  Giving every request a unique, increasing id lets the
//! receiver of a reply look up *which* request it answers.
//!
//! Ids start at 1 because `0` is reserved on the bridge wire protocol for
//! messages that answer no request (see
//! [`UNCORRELATED_ID`](crate::protocol::messages::UNCORRELATED_ID)).
//!
//! # Thread safety
//!
//! The counter uses `AtomicI64` internally, so two tasks can call
//! [`SequenceCounter::next`] simultaneously without ever receiving the same
//! value.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::protocol::messages::RequestId;

/// A thread-safe, monotonically increasing request-id counter.
///
/// Each instance is independent: two counters both start at 1.
///
/// # Examples
///
/// ```rust
/// use mesh_core::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    /// The id the next call to `next()` will return.
    inner: AtomicI64,
}

impl SequenceCounter {
    /// Creates a new counter whose first id is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicI64::new(1),
        }
    }

    /// Returns the next id and atomically advances the counter.
    ///
    /// `Ordering::Relaxed` is enough: ids only need to be unique, they do not
    /// publish any other memory.
    ///
    /// Past `i64::MAX` the counter restarts at 1 instead of going negative or
    /// handing out the reserved 0; at one id per nanosecond that takes almost
    /// three centuries.
    pub fn next(&self) -> RequestId {
        self.inner
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(if current == RequestId::MAX { 1 } else { current + 1 })
            })
            // The closure always returns `Some`, so `fetch_update` cannot fail.
            .unwrap_or_else(|current| current)
    }

    /// Returns the id the next call to [`next`](Self::next) will hand out.
    ///
    /// Diagnostic only: another task may advance the counter immediately.
    pub fn peek(&self) -> RequestId {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
