//! Core types for telemon-core.
//!
//! Wire names follow the field names the monitoring agents and capture files
//! already use (`ram_libre`, `hora`, …); the Rust names are descriptive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::timestamp::CanonicalTimestamp;

/// Treat an explicit JSON `null` the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The numeric part of one monitoring sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_ram: i64,
    #[serde(rename = "ram_libre", default, deserialize_with = "null_as_default")]
    pub free_ram: i64,
    #[serde(rename = "uso_ram", default, deserialize_with = "null_as_default")]
    pub used_ram: i64,
    #[serde(rename = "porcentaje_ram", default, deserialize_with = "null_as_default")]
    pub ram_percent: f64,
    #[serde(rename = "porcentaje_cpu_uso", default, deserialize_with = "null_as_default")]
    pub cpu_percent: f64,
    #[serde(rename = "porcentaje_cpu_libre", default, deserialize_with = "null_as_default")]
    pub cpu_idle_percent: f64,
    #[serde(rename = "procesos_corriendo", default, deserialize_with = "null_as_default")]
    pub running_processes: i64,
    #[serde(rename = "total_procesos", default, deserialize_with = "null_as_default")]
    pub total_processes: i64,
    #[serde(rename = "procesos_durmiendo", default, deserialize_with = "null_as_default")]
    pub sleeping_processes: i64,
    #[serde(rename = "procesos_zombie", default, deserialize_with = "null_as_default")]
    pub zombie_processes: i64,
    #[serde(rename = "procesos_parados", default, deserialize_with = "null_as_default")]
    pub stopped_processes: i64,
}

/// A sample exactly as a client sent it. Timestamps are still untyped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleInput {
    #[serde(flatten)]
    pub metrics: Metrics,
    #[serde(rename = "hora", default, skip_serializing_if = "Option::is_none")]
    pub sampled_at: Option<serde_json::Value>,
    #[serde(
        rename = "timestamp_received",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub received_at: Option<serde_json::Value>,
}

/// A validated sample ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSample {
    pub metrics: Metrics,
    pub sampled_at: CanonicalTimestamp,
    pub received_at: CanonicalTimestamp,
    pub api: String,
}

/// A stored `monitoring_data` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub id: i64,
    #[serde(flatten)]
    pub metrics: Metrics,
    #[serde(rename = "hora")]
    pub sampled_at: CanonicalTimestamp,
    #[serde(rename = "timestamp_received")]
    pub received_at: CanonicalTimestamp,
    pub api: String,
    pub created_at: DateTime<Utc>,
}

/// Header of a capture file, as written by the collection phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    #[serde(default)]
    pub total_records: i64,
    #[serde(default)]
    pub collection_start: Option<String>,
    #[serde(default)]
    pub collection_end: Option<String>,
    #[serde(default)]
    pub duration_minutes: i64,
    #[serde(default)]
    pub users: i64,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub phase: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Capture metadata with its timestamps normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMetadata {
    pub total_records: i64,
    pub collection_start: Option<CanonicalTimestamp>,
    pub collection_end: Option<CanonicalTimestamp>,
    pub duration_minutes: i64,
    pub users: i64,
    pub generated_at: Option<CanonicalTimestamp>,
    pub phase: i64,
    pub description: Option<String>,
    pub api: String,
}

/// A stored `metadata` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub id: i64,
    pub total_records: i64,
    pub collection_start: Option<CanonicalTimestamp>,
    pub collection_end: Option<CanonicalTimestamp>,
    pub duration_minutes: i64,
    pub users: i64,
    pub generated_at: Option<CanonicalTimestamp>,
    pub phase: i64,
    pub description: Option<String>,
    pub api: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregates over `monitoring_data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_monitoring_records: i64,
    pub total_metadata_records: i64,
    pub average_cpu_usage: f64,
    pub average_ram_usage: f64,
    pub max_cpu_usage: f64,
    pub max_ram_usage: f64,
    pub api: String,
}

/// Row counts removed by a clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cleared {
    pub deleted_monitoring_records: i64,
    pub deleted_metadata_records: i64,
}
