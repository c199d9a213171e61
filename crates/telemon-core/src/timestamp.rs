//! Timestamp normaliser — turns loosely formatted sample timestamps into a
//! [`CanonicalTimestamp`].
//!
//! Parsing walks [`STRATEGIES`] in order and stops at the first match:
//! ISO-8601 (with or without an offset), then four fixed wall-clock layouts.
//! Only the wall-clock layouts see the text with its fractional seconds
//! truncated to milliseconds; an ISO match keeps every digit.
//!
//! The normaliser is a pure function. It never logs, never retries and never
//! substitutes a default time; callers decide what a failure means.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// Canonical value
// ---------------------------------------------------------------------------

/// A normalised point in time.
///
/// `Offset` is only produced by the ISO-8601 strategy, and only when the input
/// names an offset. Offset-less ISO input and every fallback layout yield a
/// `Naive` wall-clock value with no zone attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalTimestamp {
    Offset(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl CanonicalTimestamp {
    /// Wall-clock reading, ignoring any offset.
    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            CanonicalTimestamp::Offset(dt) => dt.naive_local(),
            CanonicalTimestamp::Naive(naive) => *naive,
        }
    }

    /// The explicit offset, if the input carried one.
    pub fn offset(&self) -> Option<FixedOffset> {
        match self {
            CanonicalTimestamp::Offset(dt) => Some(*dt.offset()),
            CanonicalTimestamp::Naive(_) => None,
        }
    }

    /// Current time as an offset-aware UTC value.
    pub fn now_utc() -> Self {
        CanonicalTimestamp::Offset(Utc::now().fixed_offset())
    }

    /// Decode a value previously rendered with [`fmt::Display`].
    ///
    /// This is a storage codec, not a second normalisation pass: it only
    /// accepts the two shapes `Display` produces.
    pub fn from_storage(text: &str) -> Result<Self, NormalizationFailure> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Ok(CanonicalTimestamp::Offset(dt));
        }
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .map(CanonicalTimestamp::Naive)
            .map_err(|_| NormalizationFailure::new(text))
    }
}

/// Pick the shortest of millisecond, microsecond or nanosecond precision that
/// loses nothing.
fn fraction_layout(nanos: u32) -> &'static str {
    if nanos % 1_000_000 == 0 {
        "%.3f"
    } else if nanos % 1_000 == 0 {
        "%.6f"
    } else {
        "%.9f"
    }
}

impl fmt::Display for CanonicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalTimestamp::Offset(dt) => {
                let layout = format!("%Y-%m-%dT%H:%M:%S{}%:z", fraction_layout(dt.nanosecond()));
                write!(f, "{}", dt.format(&layout))
            }
            CanonicalTimestamp::Naive(naive) => {
                let layout = format!("%Y-%m-%dT%H:%M:%S{}", fraction_layout(naive.nanosecond()));
                write!(f, "{}", naive.format(&layout))
            }
        }
    }
}

impl Serialize for CanonicalTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// The only way normalisation fails. Carries the caller's original text
/// (before trimming or truncation); empty when the value was absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp: {input:?}")]
pub struct NormalizationFailure {
    input: String,
}

impl NormalizationFailure {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// One named parse attempt: a text rewrite followed by a parser.
#[derive(Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    prepare: fn(&str) -> Cow<'_, str>,
    parse: fn(&str) -> Option<CanonicalTimestamp>,
}

impl Strategy {
    /// Run this strategy alone against already-trimmed text.
    pub fn apply(&self, text: &str) -> Option<CanonicalTimestamp> {
        (self.parse)(&(self.prepare)(text))
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Strategy").field(&self.name).finish()
    }
}

const SPACE: &str = "%Y-%m-%d %H:%M:%S";
const T_SEPARATED: &str = "%Y-%m-%dT%H:%M:%S";
const SPACE_MILLIS: &str = "%Y-%m-%d %H:%M:%S%.f";
const T_SEPARATED_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.f";

// ISO-8601 shapes beyond RFC 3339. `%z` takes `+0200` as well as `+02:00`
// and `%.f` makes the fraction optional, at any precision.
const ISO_OFFSET: &str = "%Y-%m-%dT%H:%M:%S%.f%z";
const ISO_OFFSET_MINUTES: &str = "%Y-%m-%dT%H:%M%z";
const ISO_LOCAL: &str = "%Y-%m-%dT%H:%M:%S%.f";
const ISO_LOCAL_MINUTES: &str = "%Y-%m-%dT%H:%M";
const ISO_DATE: &str = "%Y-%m-%d";

/// Attempt order. First success wins.
pub static STRATEGIES: [Strategy; 5] = [
    Strategy {
        name: "iso8601",
        prepare: expand_utc_designator,
        parse: parse_iso8601,
    },
    Strategy {
        name: "space",
        prepare: truncate_fraction,
        parse: parse_space,
    },
    Strategy {
        name: "t-separated",
        prepare: truncate_fraction,
        parse: parse_t_separated,
    },
    Strategy {
        name: "space-millis",
        prepare: truncate_fraction,
        parse: parse_space_millis,
    },
    Strategy {
        name: "t-separated-millis",
        prepare: truncate_fraction,
        parse: parse_t_separated_millis,
    },
];

/// Rewrite a trailing `Z` designator as `+00:00`. A `Z` anywhere else is
/// left alone.
fn expand_utc_designator(text: &str) -> Cow<'_, str> {
    match text.strip_suffix('Z') {
        Some(head) => Cow::Owned(format!("{head}+00:00")),
        None => Cow::Borrowed(text),
    }
}

/// Cut the fractional-seconds part to three characters when the text has
/// exactly one `.` and more than three characters follow it. Digits beyond
/// the third are dropped, not rounded.
fn truncate_fraction(text: &str) -> Cow<'_, str> {
    let Some((whole, fraction)) = text.split_once('.') else {
        return Cow::Borrowed(text);
    };
    if fraction.contains('.') {
        return Cow::Borrowed(text);
    }
    match fraction.char_indices().nth(3) {
        Some((cut, _)) => Cow::Borrowed(&text[..whole.len() + 1 + cut]),
        None => Cow::Borrowed(text),
    }
}

/// Extended ISO-8601: a `T`-separated date-time with an optional offset and
/// optional seconds, or a bare calendar date read as midnight. Fractions are
/// kept at full precision.
fn parse_iso8601(text: &str) -> Option<CanonicalTimestamp> {
    let offset = DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, ISO_OFFSET))
        .or_else(|_| DateTime::parse_from_str(text, ISO_OFFSET_MINUTES));
    if let Ok(dt) = offset {
        return Some(CanonicalTimestamp::Offset(dt));
    }

    NaiveDateTime::parse_from_str(text, ISO_LOCAL)
        .or_else(|_| NaiveDateTime::parse_from_str(text, ISO_LOCAL_MINUTES))
        .or_else(|_| {
            NaiveDate::parse_from_str(text, ISO_DATE).map(|date| date.and_time(NaiveTime::MIN))
        })
        .ok()
        .map(CanonicalTimestamp::Naive)
}

fn parse_naive(text: &str, layout: &str) -> Option<CanonicalTimestamp> {
    NaiveDateTime::parse_from_str(text, layout)
        .ok()
        .map(CanonicalTimestamp::Naive)
}

fn parse_space(text: &str) -> Option<CanonicalTimestamp> {
    parse_naive(text, SPACE)
}

fn parse_t_separated(text: &str) -> Option<CanonicalTimestamp> {
    parse_naive(text, T_SEPARATED)
}

fn parse_space_millis(text: &str) -> Option<CanonicalTimestamp> {
    parse_naive(text, SPACE_MILLIS)
}

fn parse_t_separated_millis(text: &str) -> Option<CanonicalTimestamp> {
    parse_naive(text, T_SEPARATED_MILLIS)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// A successful normalisation together with the strategy that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub strategy: &'static str,
    pub timestamp: CanonicalTimestamp,
}

/// Normalise `input`, reporting which strategy matched.
pub fn resolve(input: &str) -> Result<Resolved, NormalizationFailure> {
    let text = input.trim();
    if text.is_empty() {
        return Err(NormalizationFailure::new(input));
    }

    STRATEGIES
        .iter()
        .find_map(|strategy| {
            strategy.apply(text).map(|timestamp| Resolved {
                strategy: strategy.name,
                timestamp,
            })
        })
        .ok_or_else(|| NormalizationFailure::new(input))
}

/// Normalise a textual timestamp.
pub fn normalize(input: &str) -> Result<CanonicalTimestamp, NormalizationFailure> {
    resolve(input).map(|resolved| resolved.timestamp)
}

/// Normalise an untyped JSON value. Absent and non-string values fail the
/// same way malformed text does.
pub fn normalize_value(
    value: Option<&serde_json::Value>,
) -> Result<CanonicalTimestamp, NormalizationFailure> {
    match value {
        Some(serde_json::Value::String(text)) => normalize(text),
        Some(serde_json::Value::Null) | None => Err(NormalizationFailure::new("")),
        Some(other) => Err(NormalizationFailure::new(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
