//! Chaining dispatcher: ordered handlers, per-request outcomes and
//! wait-for-count coordination.
//!
//! WHY: Tests register an ordered set of expectations, fire concurrent
//! requests at a server, and need every mismatch reported at the end
//! rather than lost on a worker thread.
//!
//! WHAT: [`ChainingHandler`], called once per inbound request from any number
//! of worker threads.
//!
//! HOW: A single mutex serialises handler selection and guards the request
//! count and completion flag; a condvar wakes `wait_for_requests` callers.
//! The lock is dropped before a claiming handler writes its response.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::append_log::AppendOnlyLog;
use crate::counter::{RequestCounter, RequestId};
use crate::errors::{catch_panics, ChainError, MultiCauseError};
use crate::handler::{Claim, HandlerFactory, ResponseWriter, TrackingHandler};
use crate::http::exchange::{HttpExchange, ResponseLength};
use crate::http::wire::{HttpRequest, Method};
use crate::outcome::RequestOutcome;
use crate::precondition::{Ready, WaitPrecondition};

const INCOMPLETE_MESSAGE: &str = "Failed to handle all HTTP requests.";

struct ChainState {
    last: Arc<dyn WaitPrecondition>,
    completed: bool,
    request_count: usize,
}

/// Dispatches each request to the first registered handler that claims it.
///
/// # Examples
///
/// ```rust
/// use foundation_chaining::{ChainingHandler, RequestCounter, Ready};
///
/// let chain = ChainingHandler::new(RequestCounter::new(), Ready::shared());
/// // register handlers with chain.add_handler(..), serve, then:
/// chain.assert_complete().expect("no failures recorded");
/// ```
pub struct ChainingHandler {
    counter: RequestCounter,
    handlers: AppendOnlyLog<Arc<dyn TrackingHandler>>,
    outcomes: AppendOnlyLog<Arc<RequestOutcome>>,
    state: Mutex<ChainState>,
    condition: Condvar,
}

impl ChainingHandler {
    /// Creates an empty chain drawing ids from `counter`; the first
    /// registered handler receives `first` as its previous gate.
    #[must_use]
    pub fn new(counter: RequestCounter, first: Arc<dyn WaitPrecondition>) -> Self {
        Self {
            counter,
            handlers: AppendOnlyLog::new(),
            outcomes: AppendOnlyLog::new(),
            state: Mutex::new(ChainState {
                last: first,
                completed: false,
                request_count: 0,
            }),
            condition: Condvar::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ChainState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Builds a handler from the current tail gate, appends it to the chain
    /// and makes its gate the new tail.
    pub fn add_handler<H, F>(&self, factory: F) -> Arc<H>
    where
        H: TrackingHandler + 'static,
        F: HandlerFactory<H>,
    {
        let mut state = self.lock_state();
        let handler = Arc::new(factory.create(Arc::clone(&state.last)));
        self.handlers.push(Arc::clone(&handler) as Arc<dyn TrackingHandler>);
        state.last = handler.wait_precondition();
        tracing::debug!("Registered handler #{}", self.handlers.len());
        handler
    }

    /// Handles one inbound request and closes the exchange.
    ///
    /// Never fails: problems are recorded against the request's outcome and
    /// surface from [`Self::assert_complete`]. Unclaimed requests get a 500.
    pub fn handle(&self, mut exchange: HttpExchange) -> RequestId {
        let outcome = self
            .outcomes
            .push_with(|| Arc::new(RequestOutcome::new(self.counter.next_id())));
        let id = outcome.id();
        let method = exchange.method().clone();
        let path = exchange.path().to_string();

        tracing::info!("[{id}] handling {method} {path}");

        match self.select_handler(id, exchange.request(), &outcome) {
            Some(writer) => {
                tracing::info!("[{id}] sending response for {method} {path}");
                if let Err(err) = catch_panics(|| writer.write_to(id, &mut exchange)) {
                    tracing::info!("[{id}] handling {method} {path} failed with exception: {err}");
                    outcome.record_failure(ChainError::write_failed(method.as_str(), path, err));
                }
            }
            None => {
                tracing::info!("[{id}] sending error response for unexpected request");
                if let Err(err) = Self::send_unmatched(&mut exchange, &method, &path) {
                    tracing::info!("[{id}] failed to send error response: {err}");
                }
            }
        }

        exchange.close();
        id
    }

    fn send_unmatched(
        exchange: &mut HttpExchange,
        method: &Method,
        path: &str,
    ) -> std::io::Result<()> {
        if *method == Method::HEAD {
            return exchange.send_response_headers(500, ResponseLength::None);
        }
        let message = format!("Failed {method} request to {path}");
        exchange.add_header("Content-Type", "text/plain; charset=utf-8");
        exchange.send_response_headers(500, ResponseLength::Fixed(message.len()))?;
        exchange.write_body(message.as_bytes())
    }

    /// Picks the claiming handler for a request, entirely under the lock.
    fn select_handler(
        &self,
        id: RequestId,
        request: &HttpRequest,
        outcome: &RequestOutcome,
    ) -> Option<Box<dyn ResponseWriter>> {
        let mut state = self.lock_state();
        state.request_count += 1;
        self.condition.notify_all();

        if state.completed {
            tracing::info!(
                "[{id}] received request {} {} after HTTP server has stopped.",
                request.method,
                request.path
            );
            return None;
        }

        let handlers = self.handlers.snapshot();
        let selected = catch_panics(|| {
            for handler in handlers.iter() {
                if let Claim::Claimed(writer) = handler.try_match(id, request)? {
                    return Ok(Some(writer));
                }
            }
            Ok(None)
        });

        match selected {
            Ok(Some(writer)) => Some(writer),
            Ok(None) => {
                tracing::info!("[{id}] unexpected request {} {}", request.method, request.path);
                outcome.record_failure(ChainError::unexpected_request(
                    request.method.as_str(),
                    request.path.as_str(),
                ));
                None
            }
            Err(err) => {
                tracing::info!(
                    "[{id}] error during handling of request {} {}: {err}",
                    request.method,
                    request.path
                );
                outcome.record_failure(ChainError::match_failed(
                    request.method.as_str(),
                    request.path.as_str(),
                    err,
                ));
                None
            }
        }
    }

    /// Blocks until at least `count` requests have passed through selection,
    /// whether matched, unmatched or late. There is no timeout.
    pub fn wait_for_requests(&self, count: usize) {
        let mut state = self.lock_state();
        while state.request_count < count {
            state = match self.condition.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Like [`Self::wait_for_requests`] but gives up after `timeout`.
    /// Returns whether `count` was reached.
    ///
    /// A timeout too large to form a deadline waits without one.
    pub fn wait_for_requests_timeout(&self, count: usize, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_for_requests(count);
            return true;
        };
        let mut state = self.lock_state();
        while state.request_count < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.condition.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Checks the run and marks the chain completed.
    ///
    /// The first call also runs every handler's own end-of-run check;
    /// afterwards requests are still counted but never matched. Every call
    /// reports all failed request outcomes recorded so far.
    ///
    /// # Errors
    ///
    /// One [`MultiCauseError`] carrying every failure as a separate cause.
    pub fn assert_complete(&self) -> Result<(), MultiCauseError> {
        let mut state = self.lock_state();

        let mut failures: Vec<Arc<ChainError>> = self
            .outcomes
            .snapshot()
            .iter()
            .filter_map(|outcome| outcome.failure())
            .collect();

        if !state.completed {
            for handler in self.handlers.snapshot().iter() {
                if let Err(err) = catch_panics(|| handler.assert_complete()) {
                    failures.push(Arc::new(ChainError::HandlerIncomplete(err)));
                }
            }
            state.completed = true;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MultiCauseError::new(INCOMPLETE_MESSAGE, failures))
        }
    }

    /// Requests that have passed through selection so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.lock_state().request_count
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.lock_state().completed
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Ids of every request received, in arrival order.
    #[must_use]
    pub fn request_ids(&self) -> Vec<RequestId> {
        self.outcomes
            .snapshot()
            .iter()
            .map(|outcome| outcome.id())
            .collect()
    }
}

impl Default for ChainingHandler {
    fn default() -> Self {
        Self::new(RequestCounter::new(), Ready::shared())
    }
}

impl core::fmt::Debug for ChainingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainingHandler")
            .field("counter", &self.counter)
            .field("handlers", &self.handlers.len())
            .field("outcomes", &self.outcomes.len())
            .finish_non_exhaustive()
    }
}
