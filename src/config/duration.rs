//! # Duration Parsing
//!
//! Handles parsing of Go-style duration strings used by `cert.maxAge`.

use regex::Regex;
use std::time::Duration;

use crate::error::{Result, SealError};

/// Parse a duration string into std::time::Duration
/// Supports single and compound formats: "30s", "90m", "720h", "1h30m", "1.5h", "7d", "0"
/// Returns Duration or error if format is invalid
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(invalid("Duration string cannot be empty"));
    }

    // A bare zero needs no unit
    if duration_trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    // Whole string must be a sequence of <number><unit> components
    let format_regex = Regex::new(r"^(?:\d+(?:\.\d+)?(?:ms|s|m|h|d))+$")
        .map_err(|e| invalid(format!("Failed to compile regex: {e}")))?;
    let component_regex = Regex::new(r"(?P<number>\d+(?:\.\d+)?)(?P<unit>ms|s|m|h|d)")
        .map_err(|e| invalid(format!("Failed to compile regex: {e}")))?;

    let interval_lower = duration_trimmed.to_lowercase();

    if !format_regex.is_match(&interval_lower) {
        return Err(invalid(format!(
            "Invalid duration format '{duration_trimmed}'. Expected format: <number><unit>[<number><unit>...] (e.g., '720h', '1h30m')"
        )));
    }

    let mut total = Duration::ZERO;
    for captures in component_regex.captures_iter(&interval_lower) {
        let number_str = &captures["number"];
        let unit = &captures["unit"];

        let number: f64 = number_str.parse().map_err(|e| {
            invalid(format!(
                "Invalid duration number '{number_str}' in '{duration_trimmed}': {e}"
            ))
        })?;

        let seconds = match unit {
            "ms" => number / 1000.0,
            "s" => number,
            "m" => number * 60.0,
            "h" => number * 3600.0,
            "d" => number * 86400.0,
            _ => {
                return Err(invalid(format!(
                    "Invalid unit '{unit}' in duration '{duration_trimmed}'. Expected: ms, s, m, h, or d"
                )));
            }
        };

        let component = Duration::try_from_secs_f64(seconds).map_err(|e| {
            invalid(format!("Duration '{duration_trimmed}' is out of range: {e}"))
        })?;
        total = total.checked_add(component).ok_or_else(|| {
            invalid(format!("Duration '{duration_trimmed}' is out of range"))
        })?;
    }

    Ok(total)
}

fn invalid(message: impl Into<String>) -> SealError {
    SealError::ConfigInvalid(message.into())
}
