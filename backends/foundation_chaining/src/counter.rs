//! Request ids drawn from a counter that several servers may share.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-unique id of one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared source of strictly increasing request ids.
///
/// Clones share the same underlying counter, so a test harness can build one
/// and hand it to every server whose logs should correlate.
///
/// ```
/// use foundation_chaining::RequestCounter;
///
/// let counter = RequestCounter::new();
/// let other = counter.clone();
///
/// assert_eq!(counter.next_id().value(), 1);
/// assert_eq!(other.next_id().value(), 2);
/// assert_eq!(counter.current(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestCounter {
    inner: Arc<AtomicU64>,
}

impl RequestCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts counting after `value`; the next id handed out is `value + 1`.
    #[must_use]
    pub fn starting_after(value: u64) -> Self {
        Self {
            inner: Arc::new(AtomicU64::new(value)),
        }
    }

    /// Draws the next id.
    pub fn next_id(&self) -> RequestId {
        RequestId(self.inner.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The most recently issued id, or the starting value if none were drawn.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::SeqCst)
    }
}
