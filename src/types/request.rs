use std::fmt::{self, Display};
use std::sync::Arc;

use http::{HeaderMap, Method};

use crate::{ErrorKind, SearchResponse};

/// Completion callback invoked with the response of a successful dispatch
pub type Callback = Arc<dyn Fn(&SearchResponse) + Send + Sync>;

/// Optional knobs for a single search request.
///
/// Everything not set here falls back to the client defaults: `GET`, no
/// extra headers, no body.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    /// HTTP method used for the request
    pub method: Option<Method>,
    /// Extra headers, merged over the client's authorization headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Option<String>,
}

/// A search request that can be queued for dispatch.
///
/// Immutable after construction. The queue owns it while enqueued; on a
/// successful dispatch the callback is invoked exactly once, on a retryable
/// failure the request is re-queued, and once its failure budget is spent
/// it is dropped.
#[derive(Clone)]
pub struct Request {
    url: String,
    params: RequestParams,
    callback: Option<Callback>,
}

impl Request {
    /// Create a request for the given target URL
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the URL is empty
    pub fn new(url: impl Into<String>) -> Result<Self, ErrorKind> {
        let url = url.into();
        if url.is_empty() {
            return Err(ErrorKind::EmptyUrl);
        }
        Ok(Self {
            url,
            params: RequestParams::default(),
            callback: None,
        })
    }

    /// Set the request parameters
    #[must_use]
    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = params;
        self
    }

    /// Set the completion callback
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SearchResponse) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// The request target
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The request parameters
    #[must_use]
    pub const fn params(&self) -> &RequestParams {
        &self.params
    }

    /// Invoke the completion callback with the given response.
    ///
    /// Does nothing if no callback was set.
    pub fn run_callback(&self, response: &SearchResponse) {
        if let Some(callback) = &self.callback {
            callback(response);
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("url", &self.url)
            .field("params", &self.params)
            .field("callback", &self.callback.as_ref().map(|_| "Fn"))
            .finish()
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::StatusCode;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_empty_url_is_rejected() {
        assert!(matches!(Request::new(""), Err(ErrorKind::EmptyUrl)));
    }

    #[test]
    fn test_default_callback_is_a_noop() {
        let request = Request::new("https://api.github.com/search/repositories").unwrap();
        let response = SearchResponse::new(StatusCode::OK, HeaderMap::new(), json!({}));
        // must not panic
        request.run_callback(&response);
    }

    #[test]
    fn test_callback_receives_the_payload() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let request = Request::new("https://api.github.com/search/repositories")
            .unwrap()
            .on_complete(|response| {
                assert_eq!(response.data()["total_count"], 42);
                CALLS.fetch_add(1, Ordering::SeqCst);
            });

        let response =
            SearchResponse::new(StatusCode::OK, HeaderMap::new(), json!({"total_count": 42}));
        request.run_callback(&response);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
