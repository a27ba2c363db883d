//! Shared helpers for the unit tests: scripted transports, canned
//! responses, and a mock web server macro.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use serde_json::json;

use crate::transport::{Transport, TransportRequest};
use crate::{Client, ClientBuilder, ErrorKind, Result, SearchResponse};

#[macro_export]
/// Spins up a mock search API endpoint answering every GET request with
/// the given status. Further `method(args)` pairs are applied to the
/// response template, so tests can attach payloads or extra headers.
///
/// The `remaining`/`reset` form advertises a rate-limit quota the way
/// the mined API does, together with an empty search payload.
macro_rules! mock_api_server {
    ($status:expr, remaining: $remaining:expr, reset: $reset:expr) => {{
        let server = wiremock::MockServer::start().await;
        let template = wiremock::ResponseTemplate::new(http::StatusCode::from($status))
            .insert_header("x-ratelimit-remaining", $remaining.to_string().as_str())
            .insert_header("x-ratelimit-reset", $reset.to_string().as_str())
            .set_body_json(serde_json::json!({ "total_count": 0, "items": [] }));
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }};
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let server = wiremock::MockServer::start().await;
        let template = wiremock::ResponseTemplate::new(http::StatusCode::from($status))$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }};
}

enum Behavior {
    /// Produce a fresh outcome for every call
    Always(Box<dyn Fn() -> Result<SearchResponse> + Send + Sync>),
    /// Play back outcomes in order, then hang
    Script(Mutex<VecDeque<Result<SearchResponse>>>),
    /// Never complete; keeps the client busy forever
    Pending,
}

/// Scripted [`Transport`] that records every request it sees
pub(crate) struct MockTransport {
    calls: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
    behavior: Behavior,
}

impl MockTransport {
    pub(crate) fn always<F>(outcome: F) -> Self
    where
        F: Fn() -> Result<SearchResponse> + Send + Sync + 'static,
    {
        Self::new(Behavior::Always(Box::new(outcome)))
    }

    pub(crate) fn script(outcomes: Vec<Result<SearchResponse>>) -> Self {
        Self::new(Behavior::Script(Mutex::new(outcomes.into())))
    }

    pub(crate) fn pending() -> Self {
        Self::new(Behavior::Pending)
    }

    fn new(behavior: Behavior) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            behavior,
        }
    }

    /// Number of requests that reached the transport
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Target URLs in dispatch order
    pub(crate) fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }

    /// The most recently dispatched request
    pub(crate) fn last_request(&self) -> Option<TransportRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: TransportRequest) -> Result<SearchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        match &self.behavior {
            Behavior::Always(outcome) => outcome(),
            Behavior::Script(outcomes) => {
                let next = outcomes.lock().unwrap().pop_front();
                match next {
                    Some(outcome) => outcome,
                    None => std::future::pending().await,
                }
            }
            Behavior::Pending => std::future::pending().await,
        }
    }
}

/// A client over the given mock transport, with a fixed test credential
pub(crate) fn client_with(transport: Arc<MockTransport>) -> Client {
    let transport: Arc<dyn Transport> = transport;
    ClientBuilder::builder()
        .token("ghp_mocktoken-t0001")
        .transport(transport)
        .build()
        .client()
        .expect("mock client construction cannot fail")
}

/// A successful search response advertising the given quota
pub(crate) fn quota_response(remaining: i64, reset_epoch_secs: u64) -> SearchResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-ratelimit-remaining",
        remaining.to_string().parse().unwrap(),
    );
    headers.insert(
        "x-ratelimit-reset",
        reset_epoch_secs.to_string().parse().unwrap(),
    );
    SearchResponse::new(
        StatusCode::OK,
        headers,
        json!({ "total_count": 0, "items": [] }),
    )
}

/// A successful search response without any rate-limit headers
pub(crate) fn plain_response() -> SearchResponse {
    SearchResponse::new(
        StatusCode::OK,
        HeaderMap::new(),
        json!({ "total_count": 0, "items": [] }),
    )
}

/// A rejection with the given status and response headers
pub(crate) fn rejected(status: u16, headers: &[(&str, &str)]) -> ErrorKind {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            http::HeaderName::try_from(*name).unwrap(),
            value.parse().unwrap(),
        );
    }
    ErrorKind::RejectedStatusCode {
        status: StatusCode::from_u16(status).unwrap(),
        headers: Box::new(map),
    }
}

/// A plain HTTP 500 without headers
pub(crate) fn server_error() -> ErrorKind {
    rejected(500, &[])
}
