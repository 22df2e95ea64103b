//! Fixture handler that expects a single request and answers it with a
//! fixed response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::counter::RequestId;
use crate::errors::BoxedError;
use crate::handler::{Claim, ResponseWriter, TrackingHandler};
use crate::http::exchange::HttpExchange;
use crate::http::wire::{HttpRequest, HttpResponse, Method};
use crate::precondition::{Latch, WaitPrecondition};

/// Expects one `method path` request.
///
/// The request is only claimed once the previously registered handler's
/// gate is satisfied, so a chain of `ExpectRequest`s enforces arrival order.
/// The handler's own gate opens when it claims its request.
///
/// # Examples
///
/// ```rust
/// use foundation_chaining::{ChainingHandler, ExpectRequest};
///
/// let chain = ChainingHandler::default();
/// let expectation = chain.add_handler(ExpectRequest::get("/a").respond_with("OK"));
/// assert!(!expectation.is_received());
/// ```
pub struct ExpectRequest {
    method: Method,
    path: String,
    response: HttpResponse,
    previous: Arc<dyn WaitPrecondition>,
    received: AtomicBool,
    gate: Arc<Latch>,
}

/// Factory for [`ExpectRequest`], consumed by `ChainingHandler::add_handler`.
#[derive(Debug, Clone)]
pub struct ExpectRequestBuilder {
    method: Method,
    path: String,
    response: HttpResponse,
}

impl ExpectRequest {
    #[must_use]
    pub fn expecting(method: Method, path: impl Into<String>) -> ExpectRequestBuilder {
        ExpectRequestBuilder {
            method,
            path: path.into(),
            response: HttpResponse::status(200),
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> ExpectRequestBuilder {
        Self::expecting(Method::GET, path)
    }

    #[must_use]
    pub fn head(path: impl Into<String>) -> ExpectRequestBuilder {
        Self::expecting(Method::HEAD, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> ExpectRequestBuilder {
        Self::expecting(Method::PUT, path)
    }

    #[must_use]
    pub fn is_received(&self) -> bool {
        self.received.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

impl ExpectRequestBuilder {
    /// Answer with `200 OK` and this plain-text body.
    #[must_use]
    pub fn respond_with(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.response = HttpResponse::ok(body);
        self
    }

    #[must_use]
    pub fn respond(mut self, response: HttpResponse) -> Self {
        self.response = response;
        self
    }
}

impl crate::handler::HandlerFactory<ExpectRequest> for ExpectRequestBuilder {
    fn create(self, previous: Arc<dyn WaitPrecondition>) -> ExpectRequest {
        ExpectRequest {
            method: self.method,
            path: self.path,
            response: self.response,
            previous,
            received: AtomicBool::new(false),
            gate: Arc::new(Latch::new()),
        }
    }
}

impl TrackingHandler for ExpectRequest {
    fn wait_precondition(&self) -> Arc<dyn WaitPrecondition> {
        Arc::clone(&self.gate) as Arc<dyn WaitPrecondition>
    }

    fn try_match(&self, id: RequestId, request: &HttpRequest) -> Result<Claim, BoxedError> {
        if self.is_received() || request.method != self.method || request.path != self.path {
            return Ok(Claim::NotClaimed);
        }
        if !self.previous.is_satisfied() {
            tracing::debug!("[{id}] {} waiting on previous handler", self.describe());
            return Ok(Claim::NotClaimed);
        }

        self.received.store(true, Ordering::SeqCst);
        self.gate.open();
        Ok(Claim::claimed(FixedResponse::new(self.response.clone())))
    }

    fn assert_complete(&self) -> Result<(), BoxedError> {
        if self.is_received() {
            Ok(())
        } else {
            Err(format!("did not receive expected request {}", self.describe()).into())
        }
    }
}

/// Writer that sends a prepared response.
#[derive(Debug, Clone)]
pub struct FixedResponse {
    response: HttpResponse,
}

impl FixedResponse {
    #[must_use]
    pub fn new(response: HttpResponse) -> Self {
        Self { response }
    }
}

impl ResponseWriter for FixedResponse {
    fn write_to(
        self: Box<Self>,
        _id: RequestId,
        exchange: &mut HttpExchange,
    ) -> Result<(), BoxedError> {
        exchange.send(self.response)?;
        Ok(())
    }
}
