//! Ordering gates threaded from one handler to the next.
//!
//! The chain never inspects a gate. It hands handler `n` the gate exposed by
//! handler `n - 1` and leaves enforcement to the handlers themselves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Opaque readiness token a handler exposes for the handler registered after it.
pub trait WaitPrecondition: Send + Sync {
    /// Whether the owner of this gate considers its part of the run done.
    fn is_satisfied(&self) -> bool;
}

/// Gate handed to the first handler of a chain. Always satisfied.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ready;

impl Ready {
    #[must_use]
    pub fn shared() -> Arc<dyn WaitPrecondition> {
        Arc::new(Self)
    }
}

impl WaitPrecondition for Ready {
    fn is_satisfied(&self) -> bool {
        true
    }
}

/// One-way gate: starts closed, opens once and stays open.
#[derive(Debug, Default)]
pub struct Latch {
    open: AtomicBool,
}

impl Latch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
    }
}

impl WaitPrecondition for Latch {
    fn is_satisfied(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
