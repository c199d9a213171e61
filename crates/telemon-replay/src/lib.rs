//! telemon-replay — drive an ingestion endpoint with captured samples.
//!
//! Records from a capture file are POSTed by a pool of tokio workers sharing
//! one hyper client. Each record is optionally wrapped in the envelope the
//! load-test phase used:
//!
//! ```text
//! { "phase": 2, "user_id": 3, "sent_at": "…", "original_timestamp": "…", "data": { … } }
//! ```
//!
//! The ingest side unwraps `data`, so both forms store the same row.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use telemon_core::capture::CaptureFile;
use tokio::task::JoinSet;

pub const DEFAULT_PATH: &str = "/api/monitoring-data";

type HttpClient = Client<HttpConnector, Full<Bytes>>;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("invalid target url: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),
    #[error("building request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("capture has no records to replay")]
    EmptyCapture,
    #[error("at least one worker is required")]
    NoWorkers,
    #[error("replay worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How records are assigned to requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayOrder {
    /// One cursor for everyone; request `n` sends record `n % len`.
    #[default]
    Shared,
    /// Worker `k` walks the records on its own, starting at record `k`.
    PerWorker,
    /// Every request picks a record uniformly at random, with replacement.
    Random,
}

impl FromStr for ReplayOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(ReplayOrder::Shared),
            "per-worker" => Ok(ReplayOrder::PerWorker),
            "random" => Ok(ReplayOrder::Random),
            other => Err(format!(
                "unknown order {other:?} (expected shared, per-worker or random)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Scheme and authority, e.g. `http://127.0.0.1:8000`.
    pub target: String,
    pub path: String,
    pub workers: usize,
    /// Total requests; `None` sends every record once.
    pub requests: Option<usize>,
    pub order: ReplayOrder,
    pub envelope: bool,
    /// Pause between consecutive requests of one worker.
    pub delay: Duration,
    /// Envelope `phase`; defaults to the capture's own.
    pub phase: Option<i64>,
    /// Seed for [`ReplayOrder::Random`]; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            target: "http://127.0.0.1:8000".to_string(),
            path: DEFAULT_PATH.to_string(),
            workers: 4,
            requests: None,
            order: ReplayOrder::Shared,
            envelope: true,
            delay: Duration::ZERO,
            phase: None,
            seed: None,
        }
    }
}

impl ReplayOptions {
    fn endpoint(&self) -> Result<Uri, ReplayError> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Ok(format!("{}{}", self.target.trim_end_matches('/'), path).parse()?)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub sent: usize,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(elapsed.as_millis().try_into().unwrap_or(u64::MAX))
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

struct Job {
    client: HttpClient,
    endpoint: Uri,
    records: Vec<Value>,
    envelope: Option<i64>,
    delay: Duration,
    counters: Arc<Counters>,
}

impl Job {
    fn body(&self, worker: usize, record: &Value) -> Bytes {
        let Some(phase) = self.envelope else {
            return Bytes::from(record.to_string());
        };
        let original = record
            .get("timestamp_received")
            .or_else(|| record.get("hora"))
            .cloned()
            .unwrap_or(Value::Null);
        let wrapped = json!({
            "phase": phase,
            "user_id": worker,
            "sent_at": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            "original_timestamp": original,
            "data": record,
        });
        Bytes::from(wrapped.to_string())
    }

    async fn send(&self, worker: usize, index: usize) -> Result<(), ReplayError> {
        let record = &self.records[index % self.records.len()];
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header("content-type", "application/json")
            .body(Full::new(self.body(worker, record)))?;

        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        match self.client.request(request).await {
            Ok(response) => {
                let status = response.status();
                // Drain so the connection can be reused.
                let _ = response.into_body().collect().await;
                if status.is_success() {
                    self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(worker, index, %status, "replayed record rejected");
                }
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker, index, error = %err, "replay request failed");
            }
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}

/// Number of requests worker `k` of `workers` sends out of `total`.
fn share(total: usize, workers: usize, k: usize) -> usize {
    total / workers + usize::from(k < total % workers)
}

/// Record picker for worker `k`. With a seed, each worker derives its own
/// stream from it, so the picks do not depend on task scheduling.
fn picker(seed: Option<u64>, worker: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
        None => StdRng::from_os_rng(),
    }
}

/// Replay every record of `capture` according to `options`.
pub async fn replay_capture(
    capture: &CaptureFile,
    options: &ReplayOptions,
) -> Result<ReplayReport, ReplayError> {
    let phase = options.phase.unwrap_or(capture.metadata.phase);
    replay(capture.data.clone(), phase, options).await
}

/// Replay raw sample records.
pub async fn replay(
    records: Vec<Value>,
    phase: i64,
    options: &ReplayOptions,
) -> Result<ReplayReport, ReplayError> {
    if records.is_empty() {
        return Err(ReplayError::EmptyCapture);
    }
    if options.workers == 0 {
        return Err(ReplayError::NoWorkers);
    }
    let endpoint = options.endpoint()?;
    let total = options.requests.unwrap_or(records.len());
    tracing::info!(
        %endpoint,
        workers = options.workers,
        total,
        order = ?options.order,
        "starting replay"
    );

    let job = Arc::new(Job {
        client: Client::builder(TokioExecutor::new()).build_http(),
        endpoint,
        records,
        envelope: options.envelope.then_some(phase),
        delay: options.delay,
        counters: Arc::new(Counters::default()),
    });
    let cursor = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let mut workers = JoinSet::new();
    for worker in 0..options.workers {
        let job = Arc::clone(&job);
        let cursor = Arc::clone(&cursor);
        let order = options.order;
        let seed = options.seed;
        let quota = share(total, options.workers, worker);
        workers.spawn(async move {
            match order {
                ReplayOrder::Shared => loop {
                    let n = cursor.fetch_add(1, Ordering::Relaxed);
                    if n >= total {
                        break;
                    }
                    job.send(worker, n).await?;
                },
                ReplayOrder::PerWorker => {
                    for step in 0..quota {
                        job.send(worker, worker + step).await?;
                    }
                }
                ReplayOrder::Random => {
                    let mut rng = picker(seed, worker);
                    for _ in 0..quota {
                        let index = rng.random_range(0..job.records.len());
                        job.send(worker, index).await?;
                    }
                }
            }
            Ok::<(), ReplayError>(())
        });
    }

    while let Some(joined) = workers.join_next().await {
        joined??;
    }

    let report = ReplayReport {
        sent: job.counters.sent.load(Ordering::Relaxed),
        succeeded: job.counters.succeeded.load(Ordering::Relaxed),
        failed: job.counters.failed.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
    };
    tracing::info!(
        sent = report.sent,
        succeeded = report.succeeded,
        failed = report.failed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "replay finished"
    );
    Ok(report)
}
