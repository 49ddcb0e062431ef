//! Request cadence for the periodic driver.
//!
//! The delay arrives as an ISO-8601 duration in the `delay` query parameter
//! (`PT1S`, `PT0.25S`, `PT2M`, `P1DT2H` …).  Only the day and time
//! designators are accepted; calendar units (years, months, weeks) have no
//! fixed length and are rejected.
//!
//! A delay must be strictly positive: a zero period would make the interval
//! timer spin, so zero and negative values are treated like malformed input
//! and fall back to [`Delay::DEFAULT`].  Anything longer than [`Delay::MAX`]
//! is rejected as out of range, which keeps every timer deadline computable.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Errors produced while parsing an ISO-8601 duration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DelayParseError {
    /// The text is not an ISO-8601 `P[nD][T[nH][nM][n[.f]S]]` duration.
    #[error("malformed ISO-8601 duration: {0:?}")]
    Malformed(String),

    /// The duration is zero or negative.
    #[error("delay must be strictly positive: {0:?}")]
    NotPositive(String),

    /// The duration does not fit in a `std::time::Duration` or exceeds
    /// [`Delay::MAX`].
    #[error("duration out of range: {0:?}")]
    Overflow(String),
}

/// Period between two outbound request frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delay(Duration);

impl Delay {
    /// One second, used whenever the caller supplies nothing usable.
    pub const DEFAULT: Delay = Delay(Duration::from_secs(1));

    /// Longest accepted period: 365 days.
    pub const MAX: Delay = Delay(Duration::from_secs(365 * SECS_PER_DAY));

    /// Wraps a positive duration no longer than [`Delay::MAX`].
    ///
    /// # Errors
    ///
    /// Returns [`DelayParseError::NotPositive`] for a zero duration and
    /// [`DelayParseError::Overflow`] above [`Delay::MAX`].
    pub fn new(duration: Duration) -> Result<Self, DelayParseError> {
        if duration.is_zero() {
            return Err(DelayParseError::NotPositive(format!("{duration:?}")));
        }
        if duration > Self::MAX.0 {
            return Err(DelayParseError::Overflow(format!("{duration:?}")));
        }
        Ok(Self(duration))
    }

    /// Resolves the optional `delay` query parameter.
    ///
    /// Missing, malformed, out-of-range, zero or negative values yield
    /// [`Delay::DEFAULT`].
    pub fn from_query(param: Option<&str>) -> Self {
        match param {
            None => Self::DEFAULT,
            Some(raw) => raw.parse().unwrap_or_else(|e: DelayParseError| {
                debug!("ignoring delay parameter: {e}; using {}", Self::DEFAULT);
                Self::DEFAULT
            }),
        }
    }

    /// The underlying duration.
    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl FromStr for Delay {
    type Err = DelayParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.starts_with('-') {
            return Err(DelayParseError::NotPositive(s.to_string()));
        }
        let duration = parse_iso8601(text.strip_prefix('+').unwrap_or(text))
            .map_err(|kind| match kind {
                ParseFailure::Malformed => DelayParseError::Malformed(s.to_string()),
                ParseFailure::Overflow => DelayParseError::Overflow(s.to_string()),
            })?;
        Self::new(duration).map_err(|e| match e {
            DelayParseError::Overflow(_) => DelayParseError::Overflow(s.to_string()),
            _ => DelayParseError::NotPositive(s.to_string()),
        })
    }
}

// ── ISO-8601 parsing ─────────────────────────────────────────────────────────

enum ParseFailure {
    Malformed,
    Overflow,
}

const SECS_PER_DAY: u64 = 86_400;

fn parse_iso8601(text: &str) -> Result<Duration, ParseFailure> {
    let body = text
        .strip_prefix('P')
        .or_else(|| text.strip_prefix('p'))
        .ok_or(ParseFailure::Malformed)?;

    let (date, time) = match body.find(['T', 't']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };

    let mut total = Duration::ZERO;
    let mut components = 0;

    if !date.is_empty() {
        let days = date
            .strip_suffix(['D', 'd'])
            .ok_or(ParseFailure::Malformed)?;
        let secs = parse_integer(days)?
            .checked_mul(SECS_PER_DAY)
            .ok_or(ParseFailure::Overflow)?;
        total = add(total, Duration::from_secs(secs))?;
        components += 1;
    }

    if let Some(mut rest) = time {
        if rest.is_empty() {
            return Err(ParseFailure::Malformed);
        }
        for (unit, secs_per_unit) in [('H', 3_600u64), ('M', 60)] {
            if let Some(idx) = rest.find([unit, unit.to_ascii_lowercase()]) {
                let secs = parse_integer(&rest[..idx])?
                    .checked_mul(secs_per_unit)
                    .ok_or(ParseFailure::Overflow)?;
                total = add(total, Duration::from_secs(secs))?;
                rest = &rest[idx + 1..];
                components += 1;
            }
        }
        if !rest.is_empty() {
            let seconds = rest
                .strip_suffix(['S', 's'])
                .ok_or(ParseFailure::Malformed)?;
            total = add(total, parse_seconds(seconds)?)?;
            components += 1;
        }
    }

    if components == 0 {
        return Err(ParseFailure::Malformed);
    }
    Ok(total)
}

fn add(a: Duration, b: Duration) -> Result<Duration, ParseFailure> {
    a.checked_add(b).ok_or(ParseFailure::Overflow)
}

fn parse_integer(digits: &str) -> Result<u64, ParseFailure> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseFailure::Malformed);
    }
    digits.parse().map_err(|_| ParseFailure::Overflow)
}

/// Parses `12`, `12.5` or `0.000001` into a duration with nanosecond precision.
fn parse_seconds(text: &str) -> Result<Duration, ParseFailure> {
    let (whole, fraction) = match text.split_once(['.', ',']) {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (text, None),
    };
    let secs = parse_integer(whole)?;
    let nanos = match fraction {
        None => 0,
        Some(f) if f.is_empty() || f.len() > 9 || !f.bytes().all(|b| b.is_ascii_digit()) => {
            return Err(ParseFailure::Malformed)
        }
        Some(f) => {
            let padded = format!("{f:0<9}");
            padded.parse::<u32>().map_err(|_| ParseFailure::Malformed)?
        }
    };
    Ok(Duration::new(secs, nanos))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
