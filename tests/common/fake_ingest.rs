//! Fake ingestion endpoint for replay tests.
//!
//! Spins up a minimal `axum` server on a random TCP port bound to 127.0.0.1
//! that records every JSON body POSTed to `/api/monitoring-data` and answers
//! with a configurable status.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Debug)]
struct Inner {
    bodies: Vec<Value>,
    status: StatusCode,
}

/// Handle to the running fake server.
#[derive(Clone)]
pub struct FakeIngest {
    addr: SocketAddr,
    inner: Arc<Mutex<Inner>>,
}

impl FakeIngest {
    /// Start the server. Returns once it is listening.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let inner = Arc::new(Mutex::new(Inner {
            bodies: Vec::new(),
            status: StatusCode::CREATED,
        }));

        let app = Router::new()
            .route("/api/monitoring-data", post(receive))
            .with_state(inner.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(Self { addr, inner })
    }

    /// Base URL (e.g. `http://127.0.0.1:PORT`).
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Status returned for subsequent requests.
    pub fn respond_with(&self, status: StatusCode) {
        self.inner.lock().unwrap().status = status;
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.inner.lock().unwrap().bodies.clone()
    }
}

async fn receive(State(inner): State<Arc<Mutex<Inner>>>, Json(body): Json<Value>) -> StatusCode {
    let mut inner = inner.lock().unwrap();
    inner.bodies.push(body);
    inner.status
}
