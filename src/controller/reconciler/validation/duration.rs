//! # Duration Validation
//!
//! Parses Kubernetes/Go style duration strings used by `refreshInterval`.

use crate::constants::MAX_DURATION_SECS;
use anyhow::Result;
use regex::Regex;
use std::time::Duration;

/// Parse a duration string into `std::time::Duration`
///
/// Accepts one or more `<number><unit>` segments with units `ms`, `s`, `m`, `h`
/// and `d` (e.g. "30s", "1h30m", "0s"). A bare "0" is also accepted, so zero is
/// a valid result. Durations longer than one year are rejected.
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }
    if duration_trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let interval_lower = duration_trimmed.to_lowercase();

    let whole_regex = Regex::new(r"^(?:\d+(?:ms|s|m|h|d))+$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;
    if !whole_regex.is_match(&interval_lower) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{duration_trimmed}'. Expected <number><unit> segments with units ms, s, m, h or d (e.g. '30s', '1h30m')"
        ));
    }

    // Alternation order matters: "ms" must be tried before "m"
    let segment_regex = Regex::new(r"(?P<number>\d+)(?P<unit>ms|s|m|h|d)")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    let mut total = Duration::ZERO;
    for captures in segment_regex.captures_iter(&interval_lower) {
        let number_str = captures
            .name("number")
            .ok_or_else(|| {
                anyhow::anyhow!("Failed to extract number from duration '{duration_trimmed}'")
            })?
            .as_str();
        let unit = captures
            .name("unit")
            .ok_or_else(|| {
                anyhow::anyhow!("Failed to extract unit from duration '{duration_trimmed}'")
            })?
            .as_str();

        let number: u64 = number_str.parse().map_err(|e| {
            anyhow::anyhow!("Invalid duration number '{number_str}' in '{duration_trimmed}': {e}")
        })?;

        let multiplier = match unit {
            "ms" => None,
            "s" => Some(1),
            "m" => Some(60),
            "h" => Some(3600),
            "d" => Some(86400),
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid unit '{unit}' in duration '{duration_trimmed}'. Expected: ms, s, m, h, or d"
                ));
            }
        };
        let segment = match multiplier {
            None => Some(Duration::from_millis(number)),
            Some(factor) => number.checked_mul(factor).map(Duration::from_secs),
        };
        total = segment
            .and_then(|segment| total.checked_add(segment))
            .filter(|total| total.as_secs() <= MAX_DURATION_SECS)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Duration '{duration_trimmed}' exceeds the maximum of {MAX_DURATION_SECS}s"
                )
            })?;
    }

    Ok(total)
}
