//! telemon-core — telemetry ingestion core library.
//!
//! The centrepiece is [`timestamp`], the tolerant normaliser every sample
//! timestamp passes through before it is stored. Around it sit the domain
//! types, the ingest policy, configuration, the SQLite store and the
//! capture-file format.
//!
//! # Architecture
//!
//! ```text
//! HTTP payload / capture record
//!        │
//!        ▼
//!     ingest ──► timestamp ──► store (SQLite)
//! ```

pub mod capture;
pub mod config;
pub mod ingest;
pub mod store;
pub mod timestamp;
pub mod types;

pub use timestamp::{normalize, CanonicalTimestamp, NormalizationFailure};
pub use types::{Metrics, NewSample, Sample, SampleInput, Stats};
