//! Per-credential rate-limit bookkeeping.
//!
//! The remote API reports its quota through response headers
//! (`x-ratelimit-remaining`, `x-ratelimit-reset`, and `Retry-After` on
//! rejections). This module parses those fields into a [`RateLimit`]
//! snapshot which the client uses to decide when to pause itself.

mod headers;

pub(crate) use headers::{parse_rate_limit_headers, parse_retry_after};

use crate::time::Timestamp;

/// Quota snapshot of a single credential, as last reported by the API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests left in the current window
    pub remaining: i64,
    /// Epoch milliseconds at which the window resets
    pub reset_at: Timestamp,
}

impl RateLimit {
    /// Whether the quota is exhausted once the safety margin is taken
    /// into account (boundary inclusive: a remaining count equal to the
    /// margin already counts as exhausted)
    #[must_use]
    pub const fn is_exhausted(&self, safety_margin: i64) -> bool {
        self.remaining - safety_margin <= 0
    }
}
