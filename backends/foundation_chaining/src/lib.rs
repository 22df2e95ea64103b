//! Chaining request dispatcher for a test-only HTTP server.
//!
//! This crate provides:
//! - **Handler chain**: ordered [`TrackingHandler`]s; the first to claim a request answers it
//! - **Precondition threading**: each handler receives the gate exposed by the one registered before it
//! - **Outcome tracking**: every request gets one [`RequestOutcome`]; failures are reported together
//! - **Wait-for-count**: block a test thread until N requests have arrived
//! - **Test server**: [`TestHttpServer`], a thread-per-connection HTTP/1.1 listener in front of a chain
//!
//! # Examples
//!
//! ```rust
//! use foundation_chaining::{ChainingHandler, ExpectRequest, HttpExchange, HttpRequest, Method};
//!
//! let chain = ChainingHandler::default();
//! chain.add_handler(ExpectRequest::get("/a").respond_with("OK"));
//!
//! let request = HttpRequest::new(Method::GET, "/a");
//! chain.handle(HttpExchange::new(request, Box::new(std::io::sink())));
//!
//! chain.wait_for_requests(1);
//! assert!(chain.assert_complete().is_ok());
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod append_log;
pub mod chain;
pub mod counter;
pub mod errors;
pub mod expect;
pub mod handler;
pub mod http;
pub mod outcome;
pub mod precondition;

pub use append_log::AppendOnlyLog;
pub use chain::ChainingHandler;
pub use counter::{RequestCounter, RequestId};
pub use errors::{BoxedError, ChainError, MultiCauseError, PanicError, ServerError, ServerResult};
pub use expect::{ExpectRequest, ExpectRequestBuilder, FixedResponse};
pub use handler::{Claim, HandlerFactory, ResponseWriter, TrackingHandler};
pub use http::{
    HttpExchange, HttpRequest, HttpResponse, Method, ResponseLength, ServerConfig, TestHttpServer,
};
pub use outcome::RequestOutcome;
pub use precondition::{Latch, Ready, WaitPrecondition};
