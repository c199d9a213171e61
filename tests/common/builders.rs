//! Test builders for sample payloads.
//!
//! These are designed for readability in test assertions, not for production
//! use.

use serde_json::{json, Map, Value};

/// Fluent builder for a sample body as an agent would POST it.
///
/// ```rust,ignore
/// let body = SampleJson::new().cpu(42.0).hora("2025-06-17 02:21:54").build();
/// ```
#[derive(Debug, Clone)]
pub struct SampleJson {
    fields: Map<String, Value>,
}

impl SampleJson {
    pub fn new() -> Self {
        let Value::Object(fields) = json!({
            "total_ram": 2072,
            "ram_libre": 512,
            "uso_ram": 1560,
            "porcentaje_ram": 75.3,
            "porcentaje_cpu_uso": 12.0,
            "porcentaje_cpu_libre": 88.0,
            "procesos_corriendo": 2,
            "total_procesos": 180,
            "procesos_durmiendo": 170,
            "procesos_zombie": 0,
            "procesos_parados": 8,
        }) else {
            unreachable!()
        };
        Self { fields }
    }

    pub fn cpu(mut self, percent: f64) -> Self {
        self.fields.insert("porcentaje_cpu_uso".into(), json!(percent));
        self.fields
            .insert("porcentaje_cpu_libre".into(), json!(100.0 - percent));
        self
    }

    pub fn ram(mut self, percent: f64) -> Self {
        self.fields.insert("porcentaje_ram".into(), json!(percent));
        self
    }

    pub fn hora(mut self, text: &str) -> Self {
        self.fields.insert("hora".into(), json!(text));
        self
    }

    pub fn received(mut self, text: &str) -> Self {
        self.fields.insert("timestamp_received".into(), json!(text));
        self
    }

    /// Set an arbitrary field, including non-string timestamps.
    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }

    /// Wrap in the replay envelope.
    pub fn enveloped(self, phase: i64) -> Value {
        json!({
            "phase": phase,
            "user_id": 7,
            "sent_at": "2025-06-17T02:30:00.000000Z",
            "original_timestamp": self.fields.get("timestamp_received").cloned(),
            "data": self.build(),
        })
    }
}

impl Default for SampleJson {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a body through the ingest path with the default policy, as the POST
/// handler would.
pub fn new_sample(body: Value) -> telemon_core::NewSample {
    let input = telemon_core::ingest::parse_payload(body).unwrap();
    telemon_core::ingest::prepare_sample(
        input,
        telemon_core::ingest::IngestPolicy::default(),
        "Rust",
        chrono::Utc::now(),
    )
    .unwrap()
}
