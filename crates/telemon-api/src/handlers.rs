//! Route handlers.
//!
//! Every store call runs on the blocking pool; handlers themselves only
//! parse, validate and shape responses.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use telemon_core::ingest::{parse_payload, prepare_sample};
use telemon_core::store::{Store, StoreError};
use telemon_core::types::{MetadataRecord, Sample, Stats};

use crate::error::ApiError;
use crate::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

async fn blocking<T, F>(store: &Store, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    Ok(tokio::task::spawn_blocking(move || f(&store)).await??)
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// Service info
// ---------------------------------------------------------------------------

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "Monitoring Data API",
        "version": VERSION,
        "api_type": &*state.api_label,
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "api": &*state.api_label }))
}

pub async fn not_found() -> ApiError {
    ApiError::NoRoute
}

// ---------------------------------------------------------------------------
// monitoring-data
// ---------------------------------------------------------------------------

pub async fn create_sample(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let input = parse_payload(body)?;
    let sample = prepare_sample(input, state.policy, &state.api_label, Utc::now())?;

    let id = blocking(&state.store, move |store| store.insert_sample(&sample)).await?;
    tracing::debug!(id, "stored sample");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "monitoring sample stored",
            "id": id,
            "timestamp": now_text(),
            "api": &*state.api_label,
        })),
    ))
}

/// `?skip=&limit=` for listing. Missing or non-positive `limit` means the
/// configured default; anything above the maximum is clamped.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    pub fn resolve(&self, default_limit: u32, max_limit: u32) -> (u32, u32) {
        let skip = self.skip.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32;
        let limit = match self.limit {
            Some(limit) if limit > 0 => limit.min(i64::from(max_limit)) as u32,
            _ => default_limit.min(max_limit),
        };
        (skip, limit)
    }
}

pub async fn list_samples(
    State(state): State<AppState>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Vec<Sample>>, ApiError> {
    let Query(params) = params.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let (skip, limit) = params.resolve(state.default_page_size, state.max_page_size);
    let samples = blocking(&state.store, move |store| store.list_samples(skip, limit)).await?;
    Ok(Json(samples))
}

pub async fn get_sample(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Sample>, ApiError> {
    let Path(id) = id.map_err(|_| ApiError::BadRequest("invalid id".to_string()))?;
    blocking(&state.store, move |store| store.get_sample(id))
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn clear_samples(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let cleared = blocking(&state.store, |store| store.clear()).await?;
    Ok(Json(json!({
        "message": "all monitoring data deleted",
        "deleted_monitoring_records": cleared.deleted_monitoring_records,
        "deleted_metadata_records": cleared.deleted_metadata_records,
        "api": &*state.api_label,
    })))
}

// ---------------------------------------------------------------------------
// metadata / stats
// ---------------------------------------------------------------------------

pub async fn list_metadata(
    State(state): State<AppState>,
) -> Result<Json<Vec<MetadataRecord>>, ApiError> {
    Ok(Json(blocking(&state.store, |store| store.list_metadata()).await?))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    let label = state.api_label.clone();
    Ok(Json(
        blocking(&state.store, move |store| store.stats(&label)).await?,
    ))
}
