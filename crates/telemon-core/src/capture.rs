//! Capture files — the JSON written by a collection run and consumed by
//! `telemon import` and `telemon replay`.
//!
//! ```text
//! { "metadata": { "total_records": 2000, "phase": 1, … },
//!   "data":     [ { "total_ram": …, "hora": "…", … }, … ] }
//! ```
//!
//! Records are kept as raw JSON so replay can send them byte-for-byte.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ingest::{parse_payload, prepare_sample, IngestError, IngestPolicy};
use crate::store::{Store, StoreError};
use crate::timestamp::{normalize, CanonicalTimestamp, NormalizationFailure};
use crate::types::{CaptureMetadata, NewMetadata};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("capture is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("metadata.{field}: {source}")]
    Metadata {
        field: &'static str,
        #[source]
        source: NormalizationFailure,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureFile {
    #[serde(default)]
    pub metadata: CaptureMetadata,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

impl CaptureFile {
    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        let bytes = std::fs::read(path).map_err(|source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CaptureError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Outcome of [`import_capture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub metadata_id: i64,
    pub imported: usize,
    pub rejected: usize,
}

fn metadata_timestamp(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<CanonicalTimestamp>, CaptureError> {
    value
        .map(|text| normalize(text).map_err(|source| CaptureError::Metadata { field, source }))
        .transpose()
}

impl CaptureMetadata {
    /// Normalise the metadata timestamps for storage.
    pub fn prepare(&self, api: &str) -> Result<NewMetadata, CaptureError> {
        Ok(NewMetadata {
            total_records: self.total_records,
            collection_start: metadata_timestamp(
                "collection_start",
                self.collection_start.as_deref(),
            )?,
            collection_end: metadata_timestamp("collection_end", self.collection_end.as_deref())?,
            duration_minutes: self.duration_minutes,
            users: self.users,
            generated_at: metadata_timestamp("generated_at", self.generated_at.as_deref())?,
            phase: self.phase,
            description: self.description.clone(),
            api: api.to_string(),
        })
    }
}

/// Store a capture: one metadata row plus every record that passes ingest
/// validation. Invalid records are skipped and counted, not fatal.
pub fn import_capture(
    store: &Store,
    capture: &CaptureFile,
    policy: IngestPolicy,
    api: &str,
) -> Result<ImportReport, CaptureError> {
    let metadata = capture.metadata.prepare(api)?;
    let now = Utc::now();

    let mut samples = Vec::with_capacity(capture.data.len());
    let mut rejected = 0;
    for (index, record) in capture.data.iter().enumerate() {
        let prepared = parse_payload(record.clone())
            .and_then(|input| prepare_sample(input, policy, api, now));
        match prepared {
            Ok(sample) => samples.push(sample),
            Err(err) => {
                rejected += 1;
                log_rejection(index, &err);
            }
        }
    }

    let metadata_id = store.insert_metadata(&metadata)?;
    let imported = store.insert_samples(&samples)?;
    tracing::info!(metadata_id, imported, rejected, "capture imported");

    Ok(ImportReport {
        metadata_id,
        imported,
        rejected,
    })
}

fn log_rejection(index: usize, err: &IngestError) {
    tracing::warn!(index, error = %err, "skipping capture record");
}
