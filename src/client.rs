//! Handler of per-credential request operations.
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` wraps a single API credential and tracks its rate-limit
//! state across requests. `ClientBuilder` exposes a finer level of
//! granularity for building a `Client`.
//!
//! A `Client` pauses itself when its quota runs low and resumes on its
//! own schedule, so a [`Queue`](crate::Queue) can treat "authorized and
//! not busy" as the only dispatch criterion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{HeaderMap, HeaderValue, Method, header};
use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinHandle;
use typed_builder::TypedBuilder;

use crate::ratelimit::{RateLimit, parse_rate_limit_headers, parse_retry_after};
use crate::time::{self, Timestamp};
use crate::transport::{HttpTransport, Transport, TransportRequest};
use crate::{ErrorKind, RequestParams, Result, SearchResponse};

/// Default number of requests held back as a buffer before the quota is
/// treated as exhausted, 5.
pub const DEFAULT_SAFETY_MARGIN: i64 = 5;
/// Default extra wait after a quota reset before resuming, 2 seconds.
///
/// Absorbs clock skew between this machine and the API servers.
pub const DEFAULT_RESUME_BUFFER: Duration = Duration::from_millis(2000);
/// Default `Accept` header sent with every request.
pub const DEFAULT_ACCEPT: &str = "application/vnd.github.v3+json";

/// How many trailing characters of a credential may show up in logs
const TOKEN_TAIL_LEN: usize = 5;

/// Builder for [`Client`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug)]
pub struct ClientBuilder {
    /// API credential, sent as a bearer token.
    ///
    /// Only the last five characters are ever observable through
    /// [`Client::token_tail`]; the rest stays secret.
    #[builder(setter(into))]
    token: SecretString,

    /// Number of requests to keep in reserve.
    ///
    /// The client pauses once `remaining - safety_margin` reaches zero,
    /// so that requests racing against the refresh never hit a hard 403.
    #[builder(default = DEFAULT_SAFETY_MARGIN)]
    safety_margin: i64,

    /// Extra wait after the reported quota reset before resuming
    #[builder(default = DEFAULT_RESUME_BUFFER)]
    resume_buffer: Duration,

    /// Request executor. Defaults to a fresh [`HttpTransport`].
    #[builder(default, setter(strip_option))]
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Instantiates a [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if no transport was supplied and the default
    /// request client cannot be created.
    /// See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn client(self) -> Result<Client> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                token: self.token,
                safety_margin: self.safety_margin,
                resume_buffer: self.resume_buffer,
                transport,
                authorized: AtomicBool::new(true),
                busy: AtomicBool::new(false),
                quota: Mutex::new(RateLimit::default()),
                resume_task: Mutex::new(None),
            }),
        })
    }
}

/// A single authenticated credential and its availability state.
///
/// Cheap to clone; clones share the same underlying state.
///
/// See [`ClientBuilder`] which contains sane defaults for all
/// configuration options.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    token: SecretString,
    safety_margin: i64,
    resume_buffer: Duration,
    transport: Arc<dyn Transport>,
    /// `false` while the credential waits out a rate-limit window
    authorized: AtomicBool,
    /// `true` iff a request is outstanding on this credential
    busy: AtomicBool,
    /// Quota as last reported by the API
    quota: Mutex<RateLimit>,
    /// At most one pending resume timer; re-pausing replaces it
    resume_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientInner {
    fn token_tail(&self) -> String {
        let tail: Vec<char> = self
            .token
            .expose_secret()
            .chars()
            .rev()
            .take(TOKEN_TAIL_LEN)
            .collect();
        tail.into_iter().rev().collect()
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        // don't leak the resume timer past the last client handle
        if let Ok(mut pending) = self.resume_task.lock()
            && let Some(task) = pending.take()
        {
            task.abort();
        }
    }
}

impl Client {
    /// Create a client with default settings for the given credential
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the default request client cannot be created
    /// (see [`ClientBuilder::client`] for failure cases)
    pub fn new(token: impl Into<SecretString>) -> Result<Self> {
        ClientBuilder::builder().token(token).build().client()
    }

    /// The last few characters of the credential, for log correlation.
    ///
    /// This is the only part of the token that is ever exposed.
    #[must_use]
    pub fn token_tail(&self) -> String {
        self.inner.token_tail()
    }

    /// Whether the credential may be dispatched to right now
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.inner.authorized.load(Ordering::SeqCst)
    }

    /// Whether a request is currently outstanding on this credential
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    /// Quota snapshot as last reported by the API
    ///
    /// # Panics
    ///
    /// Panics if the quota mutex is poisoned
    #[must_use]
    pub fn rate_limit(&self) -> RateLimit {
        *self.inner.quota.lock().unwrap()
    }

    /// Atomically claim the credential for one dispatch.
    ///
    /// Returns `false` if it was already busy. Used by the scheduler so
    /// that a not-yet-polled dispatch task cannot be double-booked.
    pub(crate) fn reserve(&self) -> bool {
        !self.inner.busy.swap(true, Ordering::SeqCst)
    }

    /// Give a reservation back without performing a request
    pub(crate) fn release(&self) {
        self.inner.busy.store(false, Ordering::SeqCst);
    }

    /// Perform a single request with this credential.
    ///
    /// Marks the client busy for the duration of the call, refreshes the
    /// rate-limit bookkeeping from the response headers (on success *and*
    /// failure), and pauses the client when the quota is exhausted or the
    /// API answered 403/429.
    ///
    /// # Errors
    ///
    /// Re-surfaces every transport failure to the caller; rate-limit
    /// handling happens on the side and never swallows the error.
    pub async fn request(&self, url: &str, params: &RequestParams) -> Result<SearchResponse> {
        let request = self.assemble(url, params)?;

        self.inner.busy.store(true, Ordering::SeqCst);
        log::info!(
            "client {}: {} {url}",
            self.token_tail(),
            request.method.as_str(),
        );

        let outcome = self.inner.transport.execute(request).await;

        match &outcome {
            Ok(response) => self.refresh_quota(response.headers()),
            Err(err) => {
                let empty = HeaderMap::new();
                self.refresh_quota(err.response_headers().unwrap_or(&empty));
                self.pause_if_rate_limited(err);
            }
        }

        self.inner.busy.store(false, Ordering::SeqCst);
        outcome
    }

    /// Take the credential offline until (shortly after) `reset_at`.
    ///
    /// `reset_at` is epoch milliseconds. Any previously scheduled resume
    /// is cancelled, so at most one timer is pending per client. A reset
    /// that (including the resume buffer) already lies in the past
    /// resumes the client immediately.
    ///
    /// # Panics
    ///
    /// Panics when called from outside a Tokio runtime, or if the timer
    /// mutex is poisoned.
    pub fn pause(&self, reset_at: Timestamp) {
        let mut pending = self.inner.resume_task.lock().unwrap();
        if let Some(task) = pending.take() {
            task.abort();
        }

        let resume_at = reset_at.saturating_add(millis(self.inner.resume_buffer));
        let now = time::timestamp_millis();
        if resume_at <= now {
            self.inner.authorized.store(true, Ordering::SeqCst);
            log::info!("client {}: resumed", self.token_tail());
            return;
        }

        self.inner.authorized.store(false, Ordering::SeqCst);
        log::info!(
            "client {}: pausing until {} ({} from now)",
            self.token_tail(),
            time::format_timestamp(reset_at),
            humantime::format_duration(time::until(resume_at)),
        );

        // the timer holds only a weak reference; a strong one would keep
        // the client state alive until the timer fires even after every
        // handle is gone, and the abort in `Drop` could never run
        let inner = Arc::downgrade(&self.inner);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(resume_at - now)).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            inner.authorized.store(true, Ordering::SeqCst);
            if let Ok(mut pending) = inner.resume_task.lock() {
                pending.take();
            }
            log::info!("client {}: resumed", inner.token_tail());
        }));
    }

    /// Build the wire request: credential headers first, then whatever
    /// the caller supplied on top
    fn assemble(&self, url: &str, params: &RequestParams) -> Result<TransportRequest> {
        let mut headers = HeaderMap::new();

        let bearer = format!("Bearer {}", self.inner.token.expose_secret());
        let mut authorization = HeaderValue::from_str(&bearer)?;
        authorization.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, authorization);
        headers.insert(header::ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));

        for (name, value) in &params.headers {
            headers.insert(name, value.clone());
        }

        Ok(TransportRequest {
            url: url.to_string(),
            method: params.method.clone().unwrap_or(Method::GET),
            headers,
            body: params.body.clone(),
        })
    }

    /// Update the quota snapshot from response headers and pause when the
    /// remaining budget (minus the safety margin) is used up.
    ///
    /// Responses without rate-limit headers only produce a warning; the
    /// known quota state is left untouched.
    fn refresh_quota(&self, headers: &HeaderMap) {
        let Some(quota) = parse_rate_limit_headers(headers) else {
            log::warn!(
                "client {}: response carries no rate limit headers",
                self.token_tail()
            );
            return;
        };

        log::info!(
            "client {}: {} request(s) remaining, quota resets at {}",
            self.token_tail(),
            quota.remaining,
            time::format_timestamp(quota.reset_at),
        );
        *self.inner.quota.lock().unwrap() = quota;

        if quota.is_exhausted(self.inner.safety_margin) {
            self.pause(quota.reset_at);
        }
    }

    /// Handle a 403/429 rejection: prefer the server-mandated
    /// `Retry-After`, fall back to the last known quota reset
    fn pause_if_rate_limited(&self, err: &ErrorKind) {
        if !err.is_rate_limited() {
            return;
        }
        let status = err.status().map_or_else(String::new, |s| s.to_string());

        let retry_after = err
            .response_headers()
            .and_then(|headers| headers.get(header::RETRY_AFTER))
            .and_then(|value| parse_retry_after(value).ok());

        if let Some(wait) = retry_after {
            let resume_at = time::timestamp_millis().saturating_add(millis(wait));
            log::warn!(
                "client {}: rate limited ({status}), honoring Retry-After until {}",
                self.token_tail(),
                time::format_timestamp(resume_at),
            );
            self.pause(resume_at);
        } else {
            let reset_at = self.inner.quota.lock().unwrap().reset_at;
            if reset_at > 0 {
                log::warn!(
                    "client {}: rate limited ({status}), backing off until quota reset at {}",
                    self.token_tail(),
                    time::format_timestamp(reset_at),
                );
                self.pause(reset_at);
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
