//! Formatting helpers shared across report outputs.

/// Format a duration in seconds as a compact human string (e.g., "2h 15m").
pub fn format_duration(secs: i64) -> String {
    if secs < 0 {
        return "0s".to_string();
    }

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Format seconds as fractional hours with two decimals (e.g., "1.25").
pub fn format_hours(secs: i64) -> String {
    format!("{:.2}", secs as f64 / 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(60), "1m 0s");
        assert_eq!(format_duration(135), "2m 15s");
        assert_eq!(format_duration(3600), "1h 0m");
        assert_eq!(format_duration(8100), "2h 15m");
        assert_eq!(format_duration(-5), "0s");
    }

    #[test]
    fn test_format_hours() {
        assert_eq!(format_hours(3600), "1.00");
        assert_eq!(format_hours(4500), "1.25");
        assert_eq!(format_hours(0), "0.00");
    }
}
