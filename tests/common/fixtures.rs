//! Static timestamp corpora and capture documents used across harnesses.

use serde_json::{json, Value};

use super::builders::SampleJson;

/// Inputs with an explicit offset or trailing `Z`; resolved by `iso8601`.
pub const CORPUS_ISO: &[&str] = &[
    "2025-06-17T02:21:54Z",
    "2025-06-17T02:21:54.123456Z",
    "2025-06-17T02:21:54+02:00",
    "2025-06-17T02:21:54.5-05:30",
    "  2025-06-17T02:21:54Z  ",
];

/// Offset-less ISO-8601 inputs; resolved by `iso8601` without truncation.
pub const CORPUS_ISO_LOCAL: &[&str] = &[
    "2025-06-17T02:21:54",
    "2025-06-17T02:21:54.789",
    "2025-06-17T02:21:54.123456",
    "2025-06-17T02:21:54.123456789",
    "2025-06-17T02:21",
    "2025-06-17",
];

/// Offset-less inputs the agent and load tests actually send.
pub const CORPUS_NAIVE: &[&str] = &[
    "2025-06-17 02:21:54",
    "2025-06-17T02:21:54",
    "2025-06-17 02:21:54.789",
    "2025-06-17T02:21:54.123456",
    "2025-06-17 02:21:54.123456789",
];

/// Inputs no strategy accepts.
pub const CORPUS_INVALID: &[&str] = &[
    "",
    "   ",
    "not-a-date",
    "2025-13-01 00:00:00",
    "2025-06-17 02:21",
    "2025-06-17T24:00:00",
    "17/06/2025 02:21:54",
    "2025-06-17 02:21:54.12.34",
    "2025-06-17Z02:21:54",
];

/// A phase-1 capture with `n` valid records spaced one second apart.
pub fn capture_json(n: usize) -> Value {
    let data: Vec<Value> = (0..n)
        .map(|i| {
            SampleJson::new()
                .cpu(10.0 + i as f64)
                .hora(&format!("2025-06-17 02:{:02}:{:02}", 21 + i / 60, i % 60))
                .received(&format!(
                    "2025-06-17T02:{:02}:{:02}.{:06}",
                    21 + i / 60,
                    i % 60,
                    i * 1_001
                ))
                .build()
        })
        .collect();
    json!({
        "metadata": {
            "total_records": n,
            "collection_start": "2025-06-17T02:21:00.000000",
            "collection_end": "2025-06-17T02:31:00.000000",
            "duration_minutes": 10,
            "users": 300,
            "generated_at": "2025-06-17T02:31:05.123456",
            "phase": 1,
            "description": "harness capture"
        },
        "data": data
    })
}
