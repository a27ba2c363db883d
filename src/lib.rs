//! `prospector` mines rate-limited search APIs with a pool of
//! authenticated credentials.
//!
//! Each credential is wrapped in a [`Client`] that tracks its remaining
//! quota from the API's rate-limit headers and takes itself offline when
//! the quota runs out. A [`Queue`] dispatches a shared backlog of
//! [`Request`]s across all clients in parallel, retries transient
//! failures, and gives up per URL and globally once the configured
//! failure budgets are spent.
//!
//! ```no_run
//! use prospector::{Client, Queue, Request, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let clients = vec![
//!         Client::new("ghp_first-token")?,
//!         Client::new("ghp_second-token")?,
//!     ];
//!
//!     let queue = Queue::new(clients);
//!     queue.push([
//!         Request::new("https://api.github.com/search/repositories?q=stars:>=1000")?
//!             .on_complete(|response| {
//!                 println!("{} hits", response.items().map_or(0, Vec::len));
//!             }),
//!     ]);
//!     queue.start();
//!     # Ok(())
//! }
//! ```
//!
//! For finer control (safety margin, resume buffer, failure budgets, a
//! custom [`Transport`]), build the pieces through [`ClientBuilder`] and
//! [`QueueBuilder`] instead.
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_crate_dependencies,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]

#[cfg(test)]
#[macro_use]
pub mod test_utils;

mod client;
mod logger;
mod queue;
mod ratelimit;
mod time;
mod transport;
mod types;

#[doc(inline)]
pub use crate::{
    // Constants get exposed so that callers can share the library defaults
    client::{Client, ClientBuilder, DEFAULT_ACCEPT, DEFAULT_RESUME_BUFFER, DEFAULT_SAFETY_MARGIN},
    logger::{DEFAULT_LOG_DIR, init_file_logging},
    queue::{DEFAULT_MAX_PER_REQUEST, DEFAULT_POLL_INTERVAL, Queue, QueueBuilder},
    ratelimit::RateLimit,
    time::Timestamp,
    transport::{
        DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, HttpTransport, Transport, TransportRequest,
    },
    types::{Callback, ErrorKind, Request, RequestParams, Result, SearchResponse},
};
