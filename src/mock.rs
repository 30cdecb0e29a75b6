//! Mock transport for testing.
//!
//! This module provides a controllable [`Transport`] that answers from canned
//! routes, records every request, and can hold responses back on demand,
//! enabling deterministic testing of dedup, eviction and optimistic updates
//! without real I/O.
//!
//! # Basic Usage
//!
//! ```
//! use quire::mock::MockTransport;
//! use quire::registry::Method;
//! use serde_json::json;
//!
//! let mock = MockTransport::new();
//! mock.on(Method::Get, "categories/", 200, json!(["news", "rust"]));
//!
//! assert_eq!(mock.request_count(), 0);
//! ```
//!
//! # Holding responses
//!
//! [`MockTransport::pause`] keeps every request pending until
//! [`MockTransport::resume`] is called. Requests are recorded as soon as they
//! are sent, so a test can observe the cache while a call is in flight.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt as _;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::error::QueryError;
use crate::registry::Method;
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// A canned answer for one route.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(HttpResponse),
    /// No response reaches the client.
    Fail(String),
}

#[derive(Debug, Default)]
struct Routes {
    /// Replies are consumed in order; the last one is repeated.
    replies: HashMap<(Method, String), VecDeque<MockReply>>,
    requests: Vec<HttpRequest>,
}

/// A mock transport that answers requests from canned routes.
///
/// Cloning shares the same routes and request log, so one clone can live
/// inside the client while the test keeps another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    routes: Arc<Mutex<Routes>>,
    open: watch::Sender<bool>,
    sent: watch::Sender<usize>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        let (open, _) = watch::channel(true);
        let (sent, _) = watch::channel(0);
        Self {
            routes: Arc::default(),
            open,
            sent,
        }
    }

    /// Queues a JSON response for `method path`.
    pub fn on(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.push(method, path, MockReply::Respond(HttpResponse::json(status, &body)))
    }

    /// Queues a transport failure for `method path`.
    pub fn fail(&self, method: Method, path: &str, cause: &str) -> &Self {
        self.push(method, path, MockReply::Fail(cause.to_string()))
    }

    fn push(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.lock()
            .replies
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    /// Holds every response until [`resume`](Self::resume) is called.
    pub fn pause(&self) {
        self.open.send_replace(false);
    }

    pub fn resume(&self) {
        self.open.send_replace(true);
    }

    /// Returns every request sent so far.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Counts requests sent to `method path`.
    #[must_use]
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .count()
    }

    /// Waits until at least `n` requests have been sent.
    pub async fn wait_for_requests(&self, n: usize) {
        let mut sent = self.sent.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = sent.wait_for(|count| *count >= n).await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_reply(&self, request: &HttpRequest) -> MockReply {
        let mut routes = self.lock();
        match routes
            .replies
            .get_mut(&(request.method, request.path.clone()))
        {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(not_found),
            Some(queue) => queue.front().cloned().unwrap_or_else(not_found),
            None => not_found(),
        }
    }
}

fn not_found() -> MockReply {
    MockReply::Respond(HttpResponse::json(404, &json!({ "message": "Not found" })))
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, QueryError>> {
        let count = {
            let mut routes = self.lock();
            routes.requests.push(request.clone());
            routes.requests.len()
        };
        self.sent.send_replace(count);

        let mock = self.clone();
        let mut open = self.open.subscribe();

        async move {
            let _ = open.wait_for(|open| *open).await;
            match mock.next_reply(&request) {
                MockReply::Respond(response) => Ok(response),
                MockReply::Fail(cause) => Err(QueryError::Transport(cause)),
            }
        }
        .boxed()
    }
}
