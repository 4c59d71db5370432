use std::time::{self, Duration, SystemTime};

/// Seconds between the epoch and `time`, with sub-second precision.
///
/// Times before the epoch are clamped to zero.
#[must_use]
pub fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(time::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}
