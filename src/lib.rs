//! telemon — telemetry ingestion API.
//!
//! Collection agents POST host metrics samples; every sample carries two
//! loosely formatted timestamps that are normalised before storage. This
//! crate is the binary's library half so integration tests can drive the
//! same command surface the `telemon` executable exposes.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────── telemon-api (axum) ◄── HTTP clients
//! cli ──────►│                   │
//!            ├── import ──► telemon-core: ingest ► timestamp ► store (SQLite)
//!            └── replay ──► telemon-replay (hyper) ──► any ingest endpoint
//! ```

pub mod cli;
