#![allow(unused)]
//! HTTP API integration harness.
//!
//! # What this covers
//!
//! - **Prefixes**: every route answers identically at the root and under
//!   `/api`.
//! - **Create**: 201 with id and label; envelope bodies are unwrapped; absent
//!   or null timestamps default per config; present but bad ones are 400.
//! - **Listing**: newest first, `skip` / `limit`, limit clamping.
//! - **Metadata / stats / clear** after a capture import.
//!
//! Requests are driven through the router with `tower::ServiceExt::oneshot`,
//! no socket involved.
//!
//! # Running
//!
//! ```sh
//! cargo test --test api_harness
//! ```

mod common;
use common::*;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{json, Value};
use telemon_api::{router, AppState};
use telemon_core::capture::{import_capture, CaptureFile};
use telemon_core::config::Config;
use telemon_core::store::Store;
use tower::ServiceExt;

struct Harness {
    app: Router,
    store: Store,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(Config::defaults())
    }

    fn with_config(config: Config) -> Self {
        let store = Store::open_in_memory().unwrap();
        let app = router(AppState::new(store.clone(), &config));
        Self { app, store }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn post(&self, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, "/api/monitoring-data", Some(body))
            .await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None).await
    }
}

// ---------------------------------------------------------------------------
// Service info
// ---------------------------------------------------------------------------

#[rstest]
#[case::root("/")]
#[case::api_root("/api")]
#[tokio::test]
async fn root_describes_service(#[case] uri: &str) {
    let (status, body) = Harness::new().get(uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["api_type"], "Rust");
    assert!(body["version"].is_string());
}

#[rstest]
#[case::root("/health")]
#[case::api("/api/health")]
#[tokio::test]
async fn health_is_ok(#[case] uri: &str) {
    let (status, body) = Harness::new().get(uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "api": "Rust" }));
}

#[tokio::test]
async fn label_comes_from_config() {
    let config = Config::from_toml("[server]\napi_label = \"Python\"\n").unwrap();
    let harness = Harness::with_config(config);
    let (_, body) = harness.post(SampleJson::new().build()).await;
    assert_eq!(body["api"], "Python");
    let (_, sample) = harness.get(&format!("/monitoring-data/{}", body["id"])).await;
    assert_eq!(sample["api"], "Python");
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_returns_201_with_id() {
    let harness = Harness::new();
    let (status, body) = harness
        .post(
            SampleJson::new()
                .hora("2025-06-17 02:21:54")
                .received("2025-06-17T02:21:54.512345")
                .build(),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], 1);
    assert_eq!(body["api"], "Rust");
    assert!(body["message"].is_string());
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));

    let (_, sample) = harness.get("/monitoring-data/1").await;
    assert_eq!(sample["hora"], "2025-06-17T02:21:54.000");
    assert_eq!(sample["timestamp_received"], "2025-06-17T02:21:54.512345");
    assert_eq!(sample["ram_libre"], 512);
    assert_eq!(sample["porcentaje_ram"], 75.3);
}

#[tokio::test]
async fn envelope_is_unwrapped() {
    let harness = Harness::new();
    let body = SampleJson::new()
        .cpu(33.0)
        .hora("2025-06-17 02:21:54")
        .received("2025-06-17T02:21:54.100")
        .enveloped(2);
    let (status, created) = harness.post(body).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, sample) = harness
        .get(&format!("/api/monitoring-data/{}", created["id"]))
        .await;
    assert_eq!(sample["porcentaje_cpu_uso"], 33.0);
    assert_eq!(sample["timestamp_received"], "2025-06-17T02:21:54.100");
    assert!(sample.get("phase").is_none());
}

#[rstest]
#[case::absent(SampleJson::new().without("hora").without("timestamp_received").build())]
#[case::null(SampleJson::new().field("hora", Value::Null).field("timestamp_received", Value::Null).build())]
#[tokio::test]
async fn missing_timestamps_default_to_now(#[case] body: Value) {
    let harness = Harness::new();
    let (status, created) = harness.post(body).await;
    assert_eq!(status, StatusCode::CREATED);
    let sample = harness.store.get_sample(created["id"].as_i64().unwrap()).unwrap().unwrap();
    let age = chrono::Utc::now().naive_utc() - sample.sampled_at.naive_local();
    assert!(age.num_seconds().abs() < 60);
    assert_eq!(sample.sampled_at.offset().map(|o| o.local_minus_utc()), Some(0));
}

#[tokio::test]
async fn missing_timestamps_rejected_when_defaulting_is_off() {
    let config = Config::from_toml(
        "[server]\napi_label = \"Python\"\n[ingest]\ndefault_missing_timestamps = false\n",
    )
    .unwrap();
    let harness = Harness::with_config(config);
    let (status, body) = harness
        .post(SampleJson::new().received("2025-06-17 02:21:54").build())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("hora"));
    assert_eq!(body["api"], "Python");
}

#[rstest]
#[case::garbage(json!("not-a-date"))]
#[case::empty(json!(""))]
#[case::blank(json!("   "))]
#[case::number(json!(1718590914))]
#[case::object(json!({ "date": "2025-06-17" }))]
#[tokio::test]
async fn bad_timestamps_are_400(#[case] hora: Value) {
    let harness = Harness::new();
    let (status, body) = harness
        .post(SampleJson::new().field("hora", hora).build())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid timestamp"));
    assert_eq!(body["api"], "Rust");
    assert_eq!(harness.store.stats("Rust").unwrap().total_monitoring_records, 0);
}

#[rstest]
#[case::array(json!([1, 2, 3]))]
#[case::wrong_type(json!({ "total_ram": "lots" }))]
#[tokio::test]
async fn malformed_bodies_are_400(#[case] body: Value) {
    let (status, body) = Harness::new().post(body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(body["api"], "Rust");
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listing_windows_and_clamps() {
    let config = Config::from_toml("[ingest]\ndefault_page_size = 3\nmax_page_size = 5\n").unwrap();
    let harness = Harness::with_config(config);
    for i in 0..8 {
        harness
            .post(SampleJson::new().field("total_procesos", json!(i)).build())
            .await;
    }

    let procs = |body: &Value| -> Vec<i64> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|s| s["total_procesos"].as_i64().unwrap())
            .collect()
    };

    let (_, body) = harness.get("/api/monitoring-data").await;
    assert_eq!(procs(&body), vec![7, 6, 5]);

    let (_, body) = harness.get("/monitoring-data?skip=2&limit=2").await;
    assert_eq!(procs(&body), vec![5, 4]);

    let (_, body) = harness.get("/monitoring-data?limit=100").await;
    assert_eq!(procs(&body).len(), 5);

    let (_, body) = harness.get("/monitoring-data?skip=-4&limit=0").await;
    assert_eq!(procs(&body), vec![7, 6, 5]);

    let (status, _) = harness.get("/monitoring-data?limit=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_id_and_route() {
    let harness = Harness::new();
    let (status, body) = harness.get("/api/monitoring-data/404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
    assert_eq!(body["api"], "Rust");

    let (status, body) = harness.get("/api/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["api"], "Rust");
}

// ---------------------------------------------------------------------------
// Metadata / stats / clear
// ---------------------------------------------------------------------------

#[tokio::test]
async fn imported_capture_is_visible() {
    let harness = Harness::new();
    let capture: CaptureFile = serde_json::from_value(capture_json(4)).unwrap();
    import_capture(
        &harness.store,
        &capture,
        Default::default(),
        "Rust",
    )
    .unwrap();

    let (status, metadata) = harness.get("/api/metadata").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metadata[0]["total_records"], 4);
    assert_eq!(metadata[0]["phase"], 1);
    assert_eq!(metadata[0]["collection_start"], "2025-06-17T02:21:00.000");

    let (_, stats) = harness.get("/stats").await;
    assert_eq!(stats["total_monitoring_records"], 4);
    assert_eq!(stats["total_metadata_records"], 1);
    assert_eq!(stats["average_cpu_usage"], 11.5);
    assert_eq!(stats["max_cpu_usage"], 13.0);

    let (status, cleared) = harness.call(Method::DELETE, "/monitoring-data", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["deleted_monitoring_records"], 4);
    assert_eq!(cleared["deleted_metadata_records"], 1);

    let (_, stats) = harness.get("/api/stats").await;
    assert_eq!(stats["total_monitoring_records"], 0);
    assert_eq!(stats["average_cpu_usage"], 0.0);
}
