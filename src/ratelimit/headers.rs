//! Handle rate limiting headers.
//!
//! The `x-ratelimit-*` fields are not standardised yet, but there is an
//! [IETF draft](https://datatracker.ietf.org/doc/draft-ietf-httpapi-ratelimit-headers/);
//! this module sticks to the exact names the mined API sends.

use http::HeaderValue;
use std::time::{Duration, SystemTime};
use thiserror::Error;

use super::RateLimit;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum RetryAfterParseError {
    #[error("Unable to parse value '{0}'")]
    ValueError(String),

    #[error("Header value contains invalid chars")]
    HeaderValueError,
}

/// Parse the "Retry-After" header as specified per
/// [RFC 7231 section 7.1.3](https://www.rfc-editor.org/rfc/rfc7231#section-7.1.3)
pub(crate) fn parse_retry_after(value: &HeaderValue) -> Result<Duration, RetryAfterParseError> {
    let value = value
        .to_str()
        .map_err(|_| RetryAfterParseError::HeaderValueError)?;

    // RFC 7231: Retry-After = HTTP-date / delay-seconds
    value.parse::<u64>().map(Duration::from_secs).or_else(|_| {
        httpdate::parse_http_date(value)
            .map(|s| {
                s.duration_since(SystemTime::now())
                    // if date is in the past, we can use ZERO
                    .unwrap_or(Duration::ZERO)
            })
            .map_err(|_| RetryAfterParseError::ValueError(value.into()))
    })
}

/// Parse the `x-ratelimit-remaining` and `x-ratelimit-reset` header fields
/// into a quota snapshot.
///
/// `x-ratelimit-reset` is epoch seconds on the wire; the snapshot carries
/// epoch milliseconds. Returns `None` unless both fields are present and
/// numeric, so that a response without rate-limit information never
/// clobbers a known quota.
pub(crate) fn parse_rate_limit_headers(headers: &http::HeaderMap) -> Option<RateLimit> {
    let remaining = parse_header_value(headers, "x-ratelimit-remaining")?;
    let reset = parse_header_value(headers, "x-ratelimit-reset")?;

    Some(RateLimit {
        remaining: i64::try_from(remaining).ok()?,
        reset_at: reset.checked_mul(1000)?,
    })
}

/// Helper method to parse a numeric header value
fn parse_header_value(headers: &http::HeaderMap, header_name: &str) -> Option<u64> {
    headers
        .get(header_name)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{HeaderMap, HeaderValue};

    use super::{RetryAfterParseError, parse_rate_limit_headers, parse_retry_after};

    #[test]
    fn test_retry_after() {
        assert_eq!(parse_retry_after(&value("1")), Ok(Duration::from_secs(1)));
        assert_eq!(
            parse_retry_after(&value("-1")),
            Err(RetryAfterParseError::ValueError("-1".into()))
        );

        assert_eq!(
            parse_retry_after(&value("Fri, 15 May 2015 15:34:21 GMT")),
            Ok(Duration::ZERO)
        );

        let result = parse_retry_after(&value("Fri, 15 May 4099 15:34:21 GMT"));
        let is_in_future = matches!(result, Ok(d) if d.as_secs() > 0);
        assert!(is_in_future);
    }

    #[test]
    fn test_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", value("7"));
        headers.insert("x-ratelimit-reset", value("1600000000"));

        let quota = parse_rate_limit_headers(&headers).unwrap();
        assert_eq!(quota.remaining, 7);
        assert_eq!(quota.reset_at, 1_600_000_000_000);
    }

    #[test]
    fn test_rate_limit_headers_require_both_fields() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", value("7"));
        assert!(parse_rate_limit_headers(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", value("1600000000"));
        assert!(parse_rate_limit_headers(&headers).is_none());

        assert!(parse_rate_limit_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_rate_limit_headers_ignore_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", value("lots"));
        headers.insert("x-ratelimit-reset", value("1600000000"));
        assert!(parse_rate_limit_headers(&headers).is_none());
    }

    fn value(v: &str) -> HeaderValue {
        HeaderValue::from_str(v).unwrap()
    }
}
