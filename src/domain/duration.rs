use std::sync::OnceLock;

use regex::Regex;

pub const ZERO_DURATION: &str = "00:00:00";

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParsedDuration {
    total_seconds: u64,
    has_days: bool,
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$")
            .expect("duration pattern must compile")
    })
}

/// Fractional seconds round to the nearest second, halves away from zero.
/// Malformed or overflowing input yields [`ZERO_DURATION`].
pub fn normalize(text: Option<&str>) -> String {
    match text.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => match parse_duration(value) {
            Some(parsed) if parsed.has_days => format_with_days(parsed.total_seconds),
            Some(parsed) => format_seconds(parsed.total_seconds),
            None => {
                tracing::debug!(duration = value, "unparsable duration replaced by zero");
                ZERO_DURATION.to_string()
            }
        },
        None => ZERO_DURATION.to_string(),
    }
}

pub fn format_seconds(total_seconds: u64) -> String {
    let hours = total_seconds / SECONDS_PER_HOUR;
    let minutes = (total_seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = total_seconds % SECONDS_PER_MINUTE;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

fn format_with_days(total_seconds: u64) -> String {
    let days = total_seconds / SECONDS_PER_DAY;
    let remainder = total_seconds % SECONDS_PER_DAY;
    let hours = remainder / SECONDS_PER_HOUR;
    let minutes = (remainder % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = remainder % SECONDS_PER_MINUTE;
    format!("{days}:{hours:02}:{minutes:02}:{seconds:02}")
}

pub fn to_seconds(canonical: &str) -> Option<u64> {
    let parts = canonical
        .trim()
        .split(':')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<u64>>>()?;

    match parts.as_slice() {
        [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => hours
            .checked_mul(SECONDS_PER_HOUR)?
            .checked_add(minutes * SECONDS_PER_MINUTE + seconds),
        [days, hours, minutes, seconds] if *hours < 24 && *minutes < 60 && *seconds < 60 => days
            .checked_mul(SECONDS_PER_DAY)?
            .checked_add(hours * SECONDS_PER_HOUR + minutes * SECONDS_PER_MINUTE + seconds),
        _ => None,
    }
}

fn parse_duration(text: &str) -> Option<ParsedDuration> {
    let captures = duration_pattern().captures(text)?;

    let days = captures.get(1);
    let hours = captures.get(2);
    let minutes = captures.get(3);
    let seconds = captures.get(4);

    if days.is_none() && hours.is_none() && minutes.is_none() && seconds.is_none() {
        return None;
    }

    let component = |capture: Option<regex::Match<'_>>, unit: u64| -> Option<u64> {
        match capture {
            Some(value) => value.as_str().parse::<u64>().ok()?.checked_mul(unit),
            None => Some(0),
        }
    };

    let rounded_seconds = match seconds {
        Some(value) => round_seconds(value.as_str())?,
        None => 0,
    };

    let total_seconds = component(days, SECONDS_PER_DAY)?
        .checked_add(component(hours, SECONDS_PER_HOUR)?)?
        .checked_add(component(minutes, SECONDS_PER_MINUTE)?)?
        .checked_add(rounded_seconds)?;

    Some(ParsedDuration {
        total_seconds,
        has_days: days.is_some(),
    })
}

fn round_seconds(text: &str) -> Option<u64> {
    if let Ok(whole) = text.parse::<u64>() {
        return Some(whole);
    }

    let value = text.parse::<f64>().ok()?;
    // f64 keeps whole seconds exact well past any plausible runtime.
    if !value.is_finite() || value < 0.0 || value >= 9.0e15 {
        return None;
    }

    Some(value.round() as u64)
}
