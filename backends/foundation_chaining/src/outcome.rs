//! Per-request result slot.

use std::sync::{Arc, OnceLock};

use crate::counter::RequestId;
use crate::errors::ChainError;

/// Outcome of one inbound request.
///
/// Created with an empty failure slot. Only the thread processing the
/// request writes to it, and at most once.
#[derive(Debug)]
pub struct RequestOutcome {
    id: RequestId,
    failure: OnceLock<Arc<ChainError>>,
}

impl RequestOutcome {
    #[must_use]
    pub fn new(id: RequestId) -> Self {
        Self {
            id,
            failure: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Records the failure for this request. A second failure is logged and
    /// dropped; the first one recorded is the one reported.
    pub fn record_failure(&self, failure: ChainError) {
        if let Err(rejected) = self.failure.set(Arc::new(failure)) {
            tracing::warn!(
                "[{}] outcome already failed, ignoring later failure: {rejected}",
                self.id
            );
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<Arc<ChainError>> {
        self.failure.get().cloned()
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failure.get().is_some()
    }
}
