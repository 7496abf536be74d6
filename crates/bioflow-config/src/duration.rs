//! Duration parser (spec §4.1): `"1h30m15s"` style strings, or bare integer
//! seconds, into a second count.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration: `{0}`")]
pub struct InvalidDuration(pub String);

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").unwrap())
}

/// Parse a duration string into a whole number of seconds.
///
/// Accepts `(\d+h)?(\d+m)?(\d+s)?` with at least one component present, or a
/// bare non-negative integer (interpreted as seconds). `"0s"` is valid.
/// Negative values and the empty string are rejected.
pub fn parse_duration_secs(input: &str) -> Result<u64, InvalidDuration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InvalidDuration(input.to_string()));
    }

    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(secs);
    }
    // A leading '-' would otherwise fall through to the component regex and
    // simply fail to match (digits only), but reject explicitly for clarity.
    if trimmed.starts_with('-') {
        return Err(InvalidDuration(input.to_string()));
    }

    let caps = pattern()
        .captures(trimmed)
        .ok_or_else(|| InvalidDuration(input.to_string()))?;

    let hours = caps.get(1).map(|m| m.as_str());
    let minutes = caps.get(2).map(|m| m.as_str());
    let seconds = caps.get(3).map(|m| m.as_str());

    if hours.is_none() && minutes.is_none() && seconds.is_none() {
        return Err(InvalidDuration(input.to_string()));
    }

    let h: u64 = hours.map(str::parse).transpose().map_err(|_| InvalidDuration(input.to_string()))?.unwrap_or(0);
    let m: u64 = minutes.map(str::parse).transpose().map_err(|_| InvalidDuration(input.to_string()))?.unwrap_or(0);
    let s: u64 = seconds.map(str::parse).transpose().map_err(|_| InvalidDuration(input.to_string()))?.unwrap_or(0);

    Ok(h * 3600 + m * 60 + s)
}

/// Canonical `HhMmSs` rendering of a second count, used by the round-trip
/// property in spec.md §8 (invariant 4).
pub fn canonical_form(total_secs: u64) -> String {
    if total_secs == 0 {
        return "0s".to_string();
    }
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{h}h"));
    }
    if m > 0 {
        out.push_str(&format!("{m}m"));
    }
    if s > 0 || out.is_empty() {
        out.push_str(&format!("{s}s"));
    }
    out
}
