//! End-to-end tests for the chaining test server.
//!
//! These tests drive a live `TestHttpServer` over real sockets with a
//! blocking HTTP client, covering ordering, failure aggregation and
//! wait-for-count behaviour under concurrent connections.

use foundation_chaining::{
    BoxedError, ChainError, Claim, ExpectRequest, HttpExchange, HttpRequest, HttpResponse, Latch,
    Method, Ready, RequestCounter, RequestId, ServerConfig, TestHttpServer, TrackingHandler,
    WaitPrecondition,
};
use ntest::timeout;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(20))
        .build()
        .unwrap()
}

fn get(server: &TestHttpServer, path: &str) -> (u16, String) {
    let response = client().get(server.url(path)).send().unwrap();
    let status = response.status().as_u16();
    (status, response.text().unwrap())
}

/// Claims every GET under a prefix and holds each response until the
/// driver joins the shared barrier.
struct HoldOpen {
    prefix: &'static str,
    release: Arc<Barrier>,
}

impl TrackingHandler for HoldOpen {
    fn wait_precondition(&self) -> Arc<dyn WaitPrecondition> {
        Ready::shared()
    }

    fn try_match(&self, _id: RequestId, request: &HttpRequest) -> Result<Claim, BoxedError> {
        if request.method != Method::GET || !request.path.starts_with(self.prefix) {
            return Ok(Claim::NotClaimed);
        }
        let release = Arc::clone(&self.release);
        Ok(Claim::claimed(
            move |id: RequestId, exchange: &mut HttpExchange| -> Result<(), BoxedError> {
                release.wait();
                exchange.send(HttpResponse::ok(id.to_string()))?;
                Ok(())
            },
        ))
    }

    fn assert_complete(&self) -> Result<(), BoxedError> {
        Ok(())
    }
}

/// Claims a path only once the previous handler's gate is satisfied.
struct GatedPath {
    path: &'static str,
    previous: Arc<dyn WaitPrecondition>,
    gate: Arc<Latch>,
}

impl TrackingHandler for GatedPath {
    fn wait_precondition(&self) -> Arc<dyn WaitPrecondition> {
        Arc::clone(&self.gate) as Arc<dyn WaitPrecondition>
    }

    fn try_match(&self, _id: RequestId, request: &HttpRequest) -> Result<Claim, BoxedError> {
        if request.path != self.path || !self.previous.is_satisfied() {
            return Ok(Claim::NotClaimed);
        }
        self.gate.open();
        Ok(Claim::claimed(
            |_id: RequestId, exchange: &mut HttpExchange| -> Result<(), BoxedError> {
                exchange.send(HttpResponse::ok("second"))?;
                Ok(())
            },
        ))
    }

    fn assert_complete(&self) -> Result<(), BoxedError> {
        Ok(())
    }
}

#[test]
#[timeout(30000)]
fn test_single_handler_answers_and_unmatched_requests_get_500() {
    let server = TestHttpServer::start().unwrap();
    server.add_handler(ExpectRequest::get("/a").respond_with("OK"));

    assert_eq!(get(&server, "/a"), (200, "OK".to_string()));
    assert_eq!(get(&server, "/b"), (500, "Failed GET request to /b".to_string()));

    let head = client().head(server.url("/b")).send().unwrap();
    assert_eq!(head.status().as_u16(), 500);
    assert!(head.bytes().unwrap().is_empty());

    let error = server.assert_complete().expect_err("two unexpected requests");
    let messages: Vec<String> = error.causes().iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        vec![
            "Received unexpected request GET /b".to_string(),
            "Received unexpected request HEAD /b".to_string(),
        ]
    );
}

#[test]
#[timeout(30000)]
fn test_registration_order_wins_when_both_handlers_could_match() {
    let server = TestHttpServer::start().unwrap();
    let first = server.add_handler(ExpectRequest::get("/x").respond_with("first"));
    let second = server.add_handler(|previous: Arc<dyn WaitPrecondition>| GatedPath {
        path: "/x",
        previous,
        gate: Arc::new(Latch::new()),
    });

    // the second handler's gate is the first handler's, still closed
    assert!(!second.previous.is_satisfied());

    assert_eq!(get(&server, "/x"), (200, "first".to_string()));
    assert!(first.is_received());
    assert!(second.previous.is_satisfied());

    assert_eq!(get(&server, "/x"), (200, "second".to_string()));
    assert!(server.assert_complete().is_ok());
}

#[test]
#[timeout(30000)]
fn test_ordered_expectations_reject_out_of_order_requests() {
    let server = TestHttpServer::start().unwrap();
    server.add_handler(ExpectRequest::get("/1").respond_with("one"));
    server.add_handler(ExpectRequest::get("/2").respond_with("two"));

    assert_eq!(get(&server, "/2").0, 500);
    assert_eq!(get(&server, "/1"), (200, "one".to_string()));
    assert_eq!(get(&server, "/2"), (200, "two".to_string()));

    let error = server.assert_complete().expect_err("early /2 recorded");
    assert_eq!(error.causes().len(), 1);
    assert!(matches!(
        error.causes()[0].as_ref(),
        ChainError::UnexpectedRequest { .. }
    ));
}

#[test]
#[timeout(30000)]
fn test_late_request_after_completion_is_not_a_failure() {
    let server = TestHttpServer::start().unwrap();
    server.add_handler(ExpectRequest::get("/a").respond_with("OK"));

    assert_eq!(get(&server, "/a").0, 200);
    server.assert_complete().expect("clean run");

    // /a would match again if anything were consulted; nothing is
    assert_eq!(get(&server, "/a").0, 500);
    assert_eq!(server.chain().request_count(), 2);
    assert!(server.assert_complete().is_ok());
}

#[test]
#[timeout(30000)]
fn test_failures_are_reported_on_every_call() {
    let server = TestHttpServer::start().unwrap();
    server.add_handler(ExpectRequest::put("/never"));

    assert_eq!(get(&server, "/stray").0, 500);

    let first = server.assert_complete().expect_err("stray request and missing PUT");
    assert_eq!(first.causes().len(), 2);
    assert!(first
        .to_string()
        .contains("did not receive expected request PUT /never"));

    let second = server.assert_complete().expect_err("stray request still reported");
    assert_eq!(second.causes().len(), 1);
    assert_eq!(
        second.causes()[0].to_string(),
        "Received unexpected request GET /stray"
    );
}

/// WHY: The chain lock must be released before writers run
/// WHAT: 5 responses are held open at once until the driver sees all 5 arrive
#[test]
#[timeout(60000)]
fn test_concurrent_requests_overlap_and_get_unique_ids() {
    const CLIENTS: usize = 5;

    let counter = RequestCounter::starting_after(1000);
    let config = ServerConfig::new().counter(counter);
    let server = Arc::new(TestHttpServer::with_config(config).unwrap());
    let release = Arc::new(Barrier::new(CLIENTS + 1));
    server.add_handler(|_previous: Arc<dyn WaitPrecondition>| HoldOpen {
        prefix: "/slow/",
        release: Arc::clone(&release),
    });

    let mut handles = vec![];
    for i in 0..CLIENTS {
        let server = Arc::clone(&server);
        handles.push(thread::spawn(move || get(&server, &format!("/slow/{i}"))));
    }

    server.wait_for_requests(CLIENTS);
    release.wait();

    let mut ids = BTreeSet::new();
    for handle in handles {
        let (status, body) = handle.join().unwrap();
        assert_eq!(status, 200);
        ids.insert(body.parse::<u64>().unwrap());
    }

    let expected: BTreeSet<u64> = (1001..=1000 + CLIENTS as u64).collect();
    assert_eq!(ids, expected);
    assert!(server.assert_complete().is_ok());
}

#[test]
#[timeout(30000)]
fn test_wait_for_requests_does_not_return_early() {
    let server = Arc::new(TestHttpServer::start().unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let waiter = {
        let server = Arc::clone(&server);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            server.wait_for_requests(2);
            done.store(true, Ordering::SeqCst);
        })
    };

    get(&server, "/one");
    thread::sleep(Duration::from_millis(200));
    assert!(!done.load(Ordering::SeqCst));

    get(&server, "/two");
    waiter.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
}

#[test]
#[timeout(30000)]
fn test_put_body_reaches_the_handler() {
    struct EchoPut;

    impl TrackingHandler for EchoPut {
        fn wait_precondition(&self) -> Arc<dyn WaitPrecondition> {
            Ready::shared()
        }

        fn try_match(&self, _id: RequestId, request: &HttpRequest) -> Result<Claim, BoxedError> {
            if request.method != Method::PUT {
                return Ok(Claim::NotClaimed);
            }
            let body = request.body.clone();
            Ok(Claim::claimed(
                move |_id: RequestId, exchange: &mut HttpExchange| -> Result<(), BoxedError> {
                    exchange.send(HttpResponse::with_status(201, body))?;
                    Ok(())
                },
            ))
        }

        fn assert_complete(&self) -> Result<(), BoxedError> {
            Ok(())
        }
    }

    let server = TestHttpServer::start().unwrap();
    server.add_handler(|_previous: Arc<dyn WaitPrecondition>| EchoPut);

    let response = client()
        .put(server.url("/upload"))
        .body("payload bytes")
        .send()
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    assert_eq!(response.text().unwrap(), "payload bytes");
    assert!(server.assert_complete().is_ok());
}
