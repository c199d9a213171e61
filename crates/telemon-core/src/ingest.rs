//! Ingest — turns a request payload into a [`NewSample`].
//!
//! This is the only caller of the normaliser on the write path. It owns the
//! policy for timestamps that are missing entirely: they may be defaulted to
//! the current time when [`IngestPolicy::default_missing_timestamps`] is set.
//! A timestamp that is present but malformed is always rejected.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::timestamp::{normalize_value, CanonicalTimestamp, NormalizationFailure};
use crate::types::{NewSample, SampleInput};

/// How absent timestamps are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestPolicy {
    pub default_missing_timestamps: bool,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self {
            default_missing_timestamps: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("malformed sample: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{field}: {source}")]
    Timestamp {
        field: &'static str,
        #[source]
        source: NormalizationFailure,
    },
}

/// Extract the sample from a request body.
///
/// Accepts a bare sample object or the replay envelope
/// `{"phase": …, "data": {…}}`, in which case `data` is the sample.
pub fn parse_payload(body: Value) -> Result<SampleInput, IngestError> {
    let Value::Object(mut object) = body else {
        return Err(IngestError::NotAnObject);
    };
    let sample = match object.remove("data") {
        Some(inner @ Value::Object(_)) => inner,
        Some(other) => {
            object.insert("data".to_string(), other);
            Value::Object(object)
        }
        None => Value::Object(object),
    };
    Ok(serde_json::from_value(sample)?)
}

fn timestamp_field(
    field: &'static str,
    value: Option<&Value>,
    policy: IngestPolicy,
    now: DateTime<Utc>,
) -> Result<CanonicalTimestamp, IngestError> {
    match value {
        None if policy.default_missing_timestamps => {
            Ok(CanonicalTimestamp::Offset(now.fixed_offset()))
        }
        value => normalize_value(value).map_err(|source| IngestError::Timestamp { field, source }),
    }
}

/// Validate a sample and normalise both timestamps.
pub fn prepare_sample(
    input: SampleInput,
    policy: IngestPolicy,
    api: &str,
    now: DateTime<Utc>,
) -> Result<NewSample, IngestError> {
    let sampled_at = timestamp_field("hora", input.sampled_at.as_ref(), policy, now)?;
    let received_at = timestamp_field(
        "timestamp_received",
        input.received_at.as_ref(),
        policy,
        now,
    )?;

    Ok(NewSample {
        metrics: input.metrics,
        sampled_at,
        received_at,
        api: api.to_string(),
    })
}
