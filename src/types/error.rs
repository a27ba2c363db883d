use std::path::PathBuf;

use http::{HeaderMap, StatusCode};
use thiserror::Error;

/// Kinds of request and configuration errors
/// Note: The error messages can change over time, so don't match on the output
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Network error while handling request.
    /// This does not include erroneous status codes, `RejectedStatusCode` will be used in that case.
    #[error("Network error")]
    NetworkRequest(#[source] reqwest::Error),

    /// The remote endpoint answered with a non-success status code.
    ///
    /// The response headers are kept around because rate-limit bookkeeping
    /// (`x-ratelimit-*`, `Retry-After`) lives in them even on failures.
    #[error("Rejected status code: {status}")]
    RejectedStatusCode {
        /// Status code of the response
        status: StatusCode,
        /// Headers of the rejected response
        headers: Box<HeaderMap>,
    },

    /// Cannot read the body of the received response
    #[error("Error reading response body: {0}")]
    ReadResponseBody(#[source] reqwest::Error),

    /// The network client required for making requests cannot be created
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// The given string can not be parsed into a valid URL
    #[error("Cannot parse string `{1}` as url: {0}")]
    ParseUrl(#[source] url::ParseError, String),

    /// The request target is empty and not accepted as a valid URL
    #[error("URL cannot be empty")]
    EmptyUrl,

    /// The given header could not be parsed.
    /// A possible error when converting a `HeaderValue` from a string or byte
    /// slice.
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The log output directory cannot be created
    #[error("Cannot create log directory `{1}`")]
    CreateLogDir(#[source] std::io::Error, PathBuf),

    /// The log file inside the log directory cannot be opened
    #[error("Cannot open log file `{1}`")]
    OpenLogFile(#[source] std::io::Error, PathBuf),

    /// A logger was already installed for this process
    #[error("Logger already initialized")]
    LoggerInit(#[from] log::SetLoggerError),
}

impl ErrorKind {
    /// Status code of the underlying response, if one was received
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::NetworkRequest(e) | Self::ReadResponseBody(e) => e.status(),
            Self::RejectedStatusCode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Headers of the underlying response, if one was received
    #[must_use]
    pub fn response_headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::RejectedStatusCode { headers, .. } => Some(headers),
            _ => None,
        }
    }

    /// Whether the failure is a rate-limit rejection (HTTP 403 or 429)
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self.status(),
            Some(StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS)
        )
    }
}
