//! Duration strings such as `300ms`, `1.5h` or `2h45m`

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

static COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+\.?\d*|\.\d+)(ns|us|µs|μs|ms|s|m|h)").expect("valid duration regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration {input:?}")]
pub struct DurationError {
    pub input: String,
}

/// Parse a sequence of decimal numbers with unit suffixes
///
/// Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0`
/// is accepted; negative durations are not.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let err = || DurationError {
        input: input.to_string(),
    };

    let mut rest = input.trim();
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(err());
    }

    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let caps = COMPONENT.captures(rest).ok_or_else(err)?;
        let (Some(whole), Some(number), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            return Err(err());
        };

        let value: f64 = number.as_str().parse().map_err(|_| err())?;
        let scale = match unit.as_str() {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            _ => 3600e9,
        };
        total_nanos += value * scale;
        rest = &rest[whole.end()..];
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(err());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Parse an optional duration string, falling back to `default` with a
/// warning when it is missing or malformed
pub fn parse_duration_or(input: Option<&str>, default: Duration, what: &str) -> Duration {
    match input {
        None => default,
        Some(s) => parse_duration(s).unwrap_or_else(|e| {
            log::warn!("{what}: {e}, using default of {default:?}");
            default
        }),
    }
}
