//! Shared backlog and dispatch scheduling across a pool of clients.
//!
//! A [`Queue`] owns a fixed set of [`Client`]s and a backlog of
//! [`Request`]s. Once started, a dispatch loop hands backlog entries to
//! whichever clients are authorized and idle, runs them in parallel, and
//! drives the retry and abort bookkeeping:
//!
//! - dispatch order is LIFO: the most recently pushed request goes first
//! - a failed request re-enters at the dispatch end and is retried before
//!   anything else, until its per-URL failure budget is spent
//! - once the total failure count crosses the global budget the loop
//!   gives up entirely
//!
//! The loop re-evaluates immediately after every completion and every
//! `push`/`unshift`, and at least once per poll interval to observe
//! timer-driven client resumes.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use typed_builder::TypedBuilder;

use crate::client::Client;
use crate::types::Request;

/// Default number of attempts per URL before a request is abandoned, 5.
pub const DEFAULT_MAX_PER_REQUEST: u32 = 5;
/// Default idle wait between scheduler ticks, 1 second.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Global failure budget is this many times the per-URL budget unless set
/// explicitly
const MAX_TOTAL_FACTOR: u64 = 1000;

/// Builder for [`Queue`].
#[derive(TypedBuilder, Debug, Clone, Copy)]
pub struct QueueBuilder {
    /// Attempts per URL before the request is dropped
    #[builder(default = DEFAULT_MAX_PER_REQUEST)]
    max_per_request: u32,

    /// Total failed dispatches across all URLs before the whole loop
    /// gives up. Defaults to `max_per_request` × 1000.
    #[builder(default, setter(strip_option))]
    max_total: Option<u64>,

    /// Idle wait between scheduler ticks
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    poll_interval: Duration,
}

impl QueueBuilder {
    /// Instantiates a [`Queue`] over the given clients.
    ///
    /// The client set is fixed for the lifetime of the queue; dispatch
    /// iterates it in the given order.
    #[must_use]
    pub fn queue(self, clients: Vec<Client>) -> Queue {
        let max_total = self
            .max_total
            .unwrap_or(u64::from(self.max_per_request) * MAX_TOTAL_FACTOR);

        Queue {
            inner: Arc::new(QueueInner {
                clients,
                backlog: Mutex::new(VecDeque::new()),
                ledger: Mutex::new(FailureLedger::default()),
                stopped: AtomicBool::new(false),
                running: AtomicBool::new(false),
                wake: Notify::new(),
                max_per_request: self.max_per_request,
                max_total,
                poll_interval: self.poll_interval,
            }),
        }
    }
}

/// Failure bookkeeping shared by all completion handlers.
///
/// `total` is monotonic and always equals the sum of the per-URL counts.
#[derive(Debug, Default)]
struct FailureLedger {
    total: u64,
    by_url: HashMap<String, u32>,
}

impl FailureLedger {
    /// Record one failed dispatch; returns the updated attempt count for
    /// the URL
    fn record(&mut self, url: &str) -> u32 {
        self.total += 1;
        let count = self.by_url.entry(url.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Number of distinct URLs whose failure budget is spent
    fn abandoned(&self, max_per_request: u32) -> usize {
        self.by_url
            .values()
            .filter(|&&count| count >= max_per_request)
            .count()
    }
}

/// Dispatches a shared backlog of requests across a pool of clients.
///
/// Cheap to clone; clones share the same backlog and counters. The
/// dispatch loop itself holds a clone, so the loop keeps running until
/// [`Queue::stop`] is called or the global failure budget is spent, even
/// if the caller drops its handle.
#[derive(Debug, Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

#[derive(Debug)]
struct QueueInner {
    clients: Vec<Client>,
    /// The dispatch end of the deque is the back: `push` stacks new
    /// requests there (LIFO) and retries jump the line by re-entering
    /// there as well.
    backlog: Mutex<VecDeque<Request>>,
    ledger: Mutex<FailureLedger>,
    stopped: AtomicBool,
    /// Guards against concurrent dispatch loops; `start` is idempotent
    running: AtomicBool,
    /// Woken by completions and by `push`/`unshift`/`stop`
    wake: Notify,
    max_per_request: u32,
    max_total: u64,
    poll_interval: Duration,
}

impl Queue {
    /// Create a queue with default budgets over the given clients
    #[must_use]
    pub fn new(clients: Vec<Client>) -> Self {
        QueueBuilder::builder().build().queue(clients)
    }

    /// The fixed client set, in dispatch iteration order
    #[must_use]
    pub fn clients(&self) -> &[Client] {
        &self.inner.clients
    }

    /// Current backlog size
    ///
    /// # Panics
    ///
    /// Panics if the backlog mutex is poisoned
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.backlog.lock().unwrap().len()
    }

    /// Whether the backlog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of failed dispatches across all URLs
    ///
    /// # Panics
    ///
    /// Panics if the ledger mutex is poisoned
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.inner.ledger.lock().unwrap().total
    }

    /// Number of distinct URLs that have been abandoned because their
    /// failure budget is spent
    ///
    /// # Panics
    ///
    /// Panics if the ledger mutex is poisoned
    #[must_use]
    pub fn failed_request_count(&self) -> usize {
        self.inner
            .ledger
            .lock()
            .unwrap()
            .abandoned(self.inner.max_per_request)
    }

    /// Add requests to the backlog.
    ///
    /// Dispatch is LIFO: of the requests pushed here, the last one is
    /// dispatched first, and the whole batch is dispatched before
    /// anything pushed earlier.
    ///
    /// # Panics
    ///
    /// Panics if the backlog mutex is poisoned
    pub fn push(&self, requests: impl IntoIterator<Item = Request>) {
        let mut backlog = self.inner.backlog.lock().unwrap();
        for request in requests {
            backlog.push_back(request);
        }
        drop(backlog);
        self.inner.wake.notify_one();
    }

    /// Add requests at the dispatch end, preserving their relative order.
    ///
    /// Of the requests passed here, the *first* one is dispatched next.
    /// The scheduler uses this for retries; callers can use it to give a
    /// batch priority over the existing backlog.
    ///
    /// # Panics
    ///
    /// Panics if the backlog mutex is poisoned
    pub fn unshift(&self, requests: impl IntoIterator<Item = Request>) {
        let batch: Vec<Request> = requests.into_iter().collect();
        let mut backlog = self.inner.backlog.lock().unwrap();
        for request in batch.into_iter().rev() {
            backlog.push_back(request);
        }
        drop(backlog);
        self.inner.wake.notify_one();
    }

    /// Start the dispatch loop.
    ///
    /// Idempotent: calling `start` while a loop is already live is a
    /// no-op. Calling it after `stop`, or after the loop gave up on the
    /// global failure budget, starts dispatching again.
    ///
    /// # Panics
    ///
    /// Panics when called from outside a Tokio runtime
    pub fn start(&self) {
        self.inner.stopped.store(false, Ordering::SeqCst);
        if self.inner.running.swap(true, Ordering::SeqCst) {
            // a loop is already live
            return;
        }

        log::info!(
            "queue: starting dispatch loop over {} client(s)",
            self.inner.clients.len()
        );
        tokio::spawn(run_loop(Arc::clone(&self.inner)));
    }

    /// Ask the dispatch loop to exit at its next tick.
    ///
    /// In-flight requests are not cancelled; their completions still run
    /// the callback or the retry bookkeeping.
    pub fn stop(&self) {
        log::info!("queue: stop requested");
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }
}

/// One scheduler: picks free clients, pops the backlog, dispatches
async fn run_loop(inner: Arc<QueueInner>) {
    loop {
        if inner.stopped.load(Ordering::SeqCst) {
            log::info!("queue: stopped");
            break;
        }

        let failed = inner.ledger.lock().unwrap().total;
        if failed >= inner.max_total {
            log::error!(
                "queue: {failed} failed dispatches exhaust the global budget of {}, giving up",
                inner.max_total
            );
            break;
        }

        dispatch_wave(&inner);

        // Completions and new work wake the loop right away; the timeout
        // exists for changes it cannot observe, like a client resuming
        // from a rate-limit pause.
        let _ = tokio::time::timeout(inner.poll_interval, inner.wake.notified()).await;
    }

    inner.running.store(false, Ordering::SeqCst);
}

/// Hand backlog entries to every client that is authorized and idle.
///
/// Clients are claimed before the backlog is popped, so a dispatch task
/// that has not been polled yet can never be double-booked.
fn dispatch_wave(inner: &Arc<QueueInner>) {
    for client in &inner.clients {
        if !client.is_authorized() {
            continue;
        }
        if !client.reserve() {
            continue;
        }

        let Some(request) = inner.backlog.lock().unwrap().pop_back() else {
            client.release();
            break;
        };

        tokio::spawn(dispatch(
            Arc::clone(inner),
            client.clone(),
            request,
        ));
    }
}

/// Run one request to completion and apply the retry/abort policy
async fn dispatch(inner: Arc<QueueInner>, client: Client, request: Request) {
    let outcome = client.request(request.url(), request.params()).await;

    match outcome {
        Ok(response) => {
            // user callbacks are untrusted; a panicking one must not take
            // the scheduler down with it
            let url = request.url().to_string();
            if panic::catch_unwind(AssertUnwindSafe(|| request.run_callback(&response))).is_err() {
                log::error!("queue: completion callback for {url} panicked");
            }
        }
        Err(err) => {
            let attempts = inner.ledger.lock().unwrap().record(request.url());
            if attempts < inner.max_per_request {
                log::warn!(
                    "queue: request to {} failed (attempt {attempts}/{}), retrying: {err}",
                    request.url(),
                    inner.max_per_request,
                );
                let mut backlog = inner.backlog.lock().unwrap();
                backlog.push_back(request);
            } else {
                log::error!(
                    "queue: giving up on {} after {attempts} failed attempt(s): {err}",
                    request.url(),
                );
            }
        }
    }

    inner.wake.notify_one();
}
