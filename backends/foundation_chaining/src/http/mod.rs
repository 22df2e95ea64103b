//! HTTP test server utilities.
//!
//! WHY: Provides a real HTTP test server built on stdlib TCP, so the chain
//! can be exercised by any HTTP client.
//!
//! WHAT: `TestHttpServer` plus the request, response and exchange types the
//! chain and its handlers work with.
//!
//! HOW: Uses stdlib's `TcpListener` with hand-parsed HTTP/1.1 requests and
//! hand-rendered responses, one request per connection.

mod config;
pub(crate) mod exchange;
mod server;
pub(crate) mod wire;

pub use config::ServerConfig;
pub use exchange::{HttpExchange, ResponseLength};
pub use server::TestHttpServer;
pub use wire::{reason_phrase, HttpRequest, HttpResponse, Method};
