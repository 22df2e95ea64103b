//! Seams between the chain and the handlers registered on it.

use std::sync::Arc;

use crate::counter::RequestId;
use crate::errors::BoxedError;
use crate::http::exchange::HttpExchange;
use crate::http::wire::HttpRequest;
use crate::precondition::WaitPrecondition;

/// Produces the response for a request a handler has claimed.
///
/// Runs outside the chain lock, so writers for different requests may
/// stream (or block) concurrently.
pub trait ResponseWriter: Send {
    /// # Errors
    ///
    /// Any failure is recorded against the request and reported by
    /// `assert_complete`.
    fn write_to(
        self: Box<Self>,
        id: RequestId,
        exchange: &mut HttpExchange,
    ) -> Result<(), BoxedError>;
}

impl<F> ResponseWriter for F
where
    F: FnOnce(RequestId, &mut HttpExchange) -> Result<(), BoxedError> + Send,
{
    fn write_to(
        self: Box<Self>,
        id: RequestId,
        exchange: &mut HttpExchange,
    ) -> Result<(), BoxedError> {
        (*self)(id, exchange)
    }
}

/// Result of offering a request to a handler.
pub enum Claim {
    Claimed(Box<dyn ResponseWriter>),
    NotClaimed,
}

impl Claim {
    pub fn claimed<W: ResponseWriter + 'static>(writer: W) -> Self {
        Self::Claimed(Box::new(writer))
    }

    #[must_use]
    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed(_))
    }
}

impl core::fmt::Debug for Claim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claimed(_) => f.write_str("Claimed(..)"),
            Self::NotClaimed => f.write_str("NotClaimed"),
        }
    }
}

/// A handler in the chain.
///
/// `try_match` is only ever called with the chain lock held, so handlers may
/// keep plain interior state for matching decisions without further races.
pub trait TrackingHandler: Send + Sync {
    /// Gate handed to the handler registered next.
    fn wait_precondition(&self) -> Arc<dyn WaitPrecondition>;

    /// Claims the request by returning a writer, or declines it.
    ///
    /// # Errors
    ///
    /// An error (or panic) is recorded as a match failure for this request.
    fn try_match(&self, id: RequestId, request: &HttpRequest) -> Result<Claim, BoxedError>;

    /// End-of-run check, e.g. "did I receive everything I expected".
    ///
    /// # Errors
    ///
    /// Returned errors are collected by the first `assert_complete` on the chain.
    fn assert_complete(&self) -> Result<(), BoxedError>;
}

/// Builds a handler from the gate exposed by the previously registered one.
pub trait HandlerFactory<H> {
    fn create(self, previous: Arc<dyn WaitPrecondition>) -> H;
}

impl<H, F> HandlerFactory<H> for F
where
    F: FnOnce(Arc<dyn WaitPrecondition>) -> H,
{
    fn create(self, previous: Arc<dyn WaitPrecondition>) -> H {
        self(previous)
    }
}
