//! Sync periods
//!
//! Kubernetes serializes durations the Go way (`10m0s`, `1h30m`, `1.5s`).

use std::time::Duration;

/// Parse a Go-style duration string
pub fn parse_sync_period(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value == "0" {
        return Some(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = value;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return None;
        }
        let number: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        rest = &rest[unit_end..];
        total += number * seconds_per_unit;
    }

    Some(Duration::from_secs_f64(total))
}

/// Format a duration for a `syncPeriod` field
pub fn format_sync_period(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}
