// Human-readable formatting for byte counts and durations

use std::time::Duration;

const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

/// Format a byte count with two decimals and a binary unit, e.g. `1.50kB`
pub fn bytes_to_human(bytes: u64) -> String {
    let mut number = bytes as f64;
    let mut unit = UNITS[0];

    for &next in &UNITS[1..] {
        if number > 1024.0 {
            number /= 1024.0;
            unit = next;
        }
    }

    format!("{:.2}{}", number, unit)
}

/// Format a duration as days, hours, minutes and seconds, rounded down
///
/// A unit only carries into the next one when it is strictly larger than
/// the unit size, so exactly one day renders as `0 days, 24 hours, ...`.
pub fn duration_to_human(duration: Duration) -> String {
    let mut days = 0;
    let mut hours = 0;
    let mut minutes = 0;
    let mut seconds = duration.as_secs();

    if seconds > 60 {
        minutes = seconds / 60;
        seconds -= minutes * 60;
    }
    if minutes > 60 {
        hours = minutes / 60;
        minutes -= hours * 60;
    }
    if hours > 24 {
        days = hours / 24;
        hours -= days * 24;
    }

    format!(
        "{} days, {} hours, {} minutes and {} seconds",
        days, hours, minutes, seconds
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_human_small_values() {
        assert_eq!(bytes_to_human(0), "0.00B");
        assert_eq!(bytes_to_human(512), "512.00B");
        // The unit only changes strictly above 1024
        assert_eq!(bytes_to_human(1024), "1024.00B");
    }

    #[test]
    fn test_bytes_to_human_units() {
        assert_eq!(bytes_to_human(1536), "1.50kB");
        assert_eq!(bytes_to_human(5 * 1024 * 1024 + 1), "5.00MB");
        assert_eq!(bytes_to_human(3 * 1024 * 1024 * 1024 + 1), "3.00GB");
        assert_eq!(bytes_to_human(2 * 1024u64.pow(4) + 1), "2.00TB");
    }

    #[test]
    fn test_bytes_to_human_caps_at_terabytes() {
        assert_eq!(bytes_to_human(2048 * 1024u64.pow(4)), "2048.00TB");
    }

    #[test]
    fn test_duration_to_human_full_day() {
        let s = duration_to_human(Duration::from_secs(3600 * 24));
        assert!(s.starts_with("0 days, 24 hours"), "got '{}'", s);
    }

    #[test]
    fn test_duration_to_human_mixed() {
        let secs = 2 * 86400 + 3 * 3600 + 4 * 60 + 5;
        assert_eq!(
            duration_to_human(Duration::from_secs(secs)),
            "2 days, 3 hours, 4 minutes and 5 seconds"
        );
    }

    #[test]
    fn test_duration_to_human_rounds_down() {
        assert_eq!(
            duration_to_human(Duration::from_millis(59_999)),
            "0 days, 0 hours, 0 minutes and 59 seconds"
        );
    }
}
