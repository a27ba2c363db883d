//! The HTTP layer behind the per-credential clients.
//!
//! [`Transport`] is the seam between the scheduling core and the actual
//! network: the core hands over a fully assembled [`TransportRequest`] and
//! gets back either a decoded [`SearchResponse`] or an [`ErrorKind`]
//! carrying whatever response metadata was available. Tests substitute
//! their own implementation; production code uses [`HttpTransport`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, Method, header};
use url::Url;

use crate::{ErrorKind, Result, SearchResponse};

/// Default timeout in seconds before a request is deemed as failed, 30.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default user agent, `prospector-<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("prospector/", env!("CARGO_PKG_VERSION"));

/// A fully assembled request, ready to be put on the wire.
///
/// The credential headers are already merged in by the client; the
/// transport adds nothing besides its own defaults (user agent, gzip).
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Target URL
    pub url: String,
    /// HTTP method
    pub method: Method,
    /// Complete header set, including authorization
    pub headers: HeaderMap,
    /// Request body
    pub body: Option<String>,
}

/// Executes requests on behalf of a [`Client`](crate::Client).
///
/// # Errors
///
/// Implementations surface every failure through [`ErrorKind`]: network
/// errors as [`ErrorKind::NetworkRequest`], non-success status codes as
/// [`ErrorKind::RejectedStatusCode`] with the response headers attached.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Execute a single request and decode the response payload
    async fn execute(&self, request: TransportRequest) -> Result<SearchResponse>;
}

/// Production [`Transport`] backed by a shared [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the default timeout
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the underlying request client cannot be created.
    /// See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transport with a custom per-request timeout
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the underlying request client cannot be created
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(DEFAULT_USER_AGENT),
        );

        let client = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(ErrorKind::BuildRequestClient)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: TransportRequest) -> Result<SearchResponse> {
        let url =
            Url::parse(&request.url).map_err(|e| ErrorKind::ParseUrl(e, request.url.clone()))?;

        let mut builder = self
            .client
            .request(request.method, url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(ErrorKind::NetworkRequest)?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            return Err(ErrorKind::RejectedStatusCode {
                status,
                headers: Box::new(headers),
            });
        }

        let data = response.json().await.map_err(ErrorKind::ReadResponseBody)?;
        Ok(SearchResponse::new(status, headers, data))
    }
}
