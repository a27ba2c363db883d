use http::{HeaderMap, StatusCode};
use serde_json::Value;

/// Response type returned after a successful search request.
///
/// This abstraction exists because [`reqwest::Response`] cannot easily be
/// passed around once the body has been consumed; the decoded payload and
/// the headers are all the scheduler and its callers ever need.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    status: StatusCode,
    headers: HeaderMap,
    data: Value,
}

impl SearchResponse {
    /// Create a new response from its parts
    #[must_use]
    pub const fn new(status: StatusCode, headers: HeaderMap, data: Value) -> Self {
        Self {
            status,
            headers,
            data,
        }
    }

    /// Status code of the response
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers, including the rate-limit fields
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Decoded JSON payload
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// The `items` array of a search payload, if present.
    ///
    /// Search endpoints wrap their hits in an `items` field; this saves
    /// callers the indexing boilerplate.
    #[must_use]
    pub fn items(&self) -> Option<&Vec<Value>> {
        self.data.get("items")?.as_array()
    }
}
