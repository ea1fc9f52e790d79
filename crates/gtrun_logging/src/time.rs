use std::time::Duration;

/// Formats a duration for log and summary lines: `850ms`, `1.25s`, `2m 5s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        return format!("{millis}ms");
    }

    let secs = duration.as_secs();
    if secs < 60 {
        return format!("{:.2}s", duration.as_secs_f64());
    }

    format!("{}m {}s", secs / 60, secs % 60)
}
