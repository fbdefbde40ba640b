//! Small helpers shared across modules.

use chrono::DateTime;

/// Current wall-clock time as epoch milliseconds.
#[allow(clippy::cast_possible_truncation)]
pub fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Format an epoch-milliseconds timestamp for display,
/// e.g. `"2026-08-23 14:05:09 UTC"`.
#[allow(clippy::cast_possible_wrap)]
pub fn format_time(epoch_ms: u64) -> String {
    DateTime::from_timestamp_millis(epoch_ms as i64)
        .map_or_else(|| format!("@{epoch_ms}ms"), |dt| {
            dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time_known_epoch() {
        assert_eq!(format_time(0), "1970-01-01 00:00:00 UTC");
        // 2024-08-23 08:00:00 UTC
        assert_eq!(format_time(1_724_400_000_000), "2024-08-23 08:00:00 UTC");
    }

    #[test]
    fn test_now_epoch_ms_is_sane() {
        // After 2020, before 2100
        let now = now_epoch_ms();
        assert!(now > 1_577_836_800_000);
        assert!(now < 4_102_444_800_000);
    }
}
