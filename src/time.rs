use std::time::{Duration, SystemTime};

/// Milliseconds since the UNIX epoch.
pub type Timestamp = u64;

/// Get the current UNIX timestamp in milliseconds
///
/// # Panics
///
/// Panics when the system clock is incorrectly configured
pub(crate) fn timestamp_millis() -> Timestamp {
    let millis = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("SystemTime before UNIX EPOCH!")
        .as_millis();
    u64::try_from(millis).expect("SystemTime out of u64 range")
}

/// Render an epoch-millis timestamp as RFC 3339 for log output
pub(crate) fn format_timestamp(at: Timestamp) -> String {
    let at = SystemTime::UNIX_EPOCH + Duration::from_millis(at);
    humantime::format_rfc3339_seconds(at).to_string()
}

/// Time left until `at`, clamped to zero for timestamps in the past.
///
/// Sub-second precision is dropped so that humanized log output stays
/// readable ("2h 3m 20s" instead of "2h 3m 20s 417ms").
pub(crate) fn until(at: Timestamp) -> Duration {
    Duration::from_secs(at.saturating_sub(timestamp_millis()) / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_timestamp(1_600_000_000_000), "2020-09-13T12:26:40Z");
    }

    #[test]
    fn test_until_past_is_zero() {
        assert_eq!(until(0), Duration::ZERO);
    }

    #[test]
    fn test_until_future() {
        let in_an_hour = timestamp_millis() + 3_600_000;
        let left = until(in_an_hour);
        assert!(left >= Duration::from_secs(3_598));
        assert!(left <= Duration::from_secs(3_600));
    }
}
