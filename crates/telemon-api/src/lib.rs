//! telemon-api — HTTP surface over the telemon store.
//!
//! Every route is mounted twice, at the root and under `/api`, so clients
//! written against either prefix keep working.
//!
//! ```text
//! GET    /                      service info
//! GET    /health                liveness
//! POST   /monitoring-data       ingest one sample (201)
//! GET    /monitoring-data       newest first, ?skip=&limit=
//! DELETE /monitoring-data       wipe samples and metadata
//! GET    /monitoring-data/{id}  one sample or 404
//! GET    /metadata              capture metadata rows
//! GET    /stats                 aggregates
//! ```

use std::future::Future;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use telemon_core::config::Config;
use telemon_core::ingest::IngestPolicy;
use telemon_core::store::Store;
use tokio::net::TcpListener;

pub mod error;
pub mod handlers;

pub use error::ApiError;

/// Shared handler state. Cheap to clone: the store is an `Arc` inside.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Store,
    pub api_label: Arc<str>,
    pub policy: IngestPolicy,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl AppState {
    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            store,
            api_label: Arc::from(config.server.api_label.as_str()),
            policy: config.ingest.policy(),
            default_page_size: config.ingest.default_page_size,
            max_page_size: config.ingest.max_page_size,
        }
    }
}

/// Build the axum router.
pub fn router(state: AppState) -> Router {
    use handlers::*;

    let routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(
            "/monitoring-data",
            post(create_sample).get(list_samples).delete(clear_samples),
        )
        .route("/monitoring-data/{id}", get(get_sample))
        .route("/metadata", get(list_metadata))
        .route("/stats", get(stats));

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .fallback(not_found)
        .layer(middleware::map_response_with_state(
            state.clone(),
            error::label_errors,
        ))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, api = %state.api_label, "telemon api listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("telemon api stopped");
    Ok(())
}
