//! HTTP error mapping.
//!
//! [`ApiError`] renders its own status and JSON body. The router's
//! [`label_errors`] layer then stamps the service label onto that body, so
//! every error a client sees has the shape `{"error", "details"?, "api"}`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use telemon_core::ingest::IngestError;
use telemon_core::store::StoreError;

use crate::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("record not found")]
    NotFound,
    #[error("endpoint not found")]
    NoRoute,
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Ingest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound | ApiError::NoRoute => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            json!({ "error": "internal server error", "details": self.to_string() })
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
            json!({ "error": self.to_string() })
        };
        let mut response = (status, Json(body.clone())).into_response();
        response.extensions_mut().insert(ErrorBody(body));
        response
    }
}

/// The JSON an [`ApiError`] rendered, kept on the response so the label layer
/// can rebuild the body without parsing it back.
#[derive(Debug, Clone)]
pub struct ErrorBody(pub Value);

/// Response layer: add the service label to error bodies. Other responses
/// pass through untouched.
pub async fn label_errors(State(state): State<AppState>, mut response: Response) -> Response {
    let Some(ErrorBody(mut body)) = response.extensions_mut().remove::<ErrorBody>() else {
        return response;
    };
    body["api"] = Value::from(&*state.api_label);
    (response.status(), Json(body)).into_response()
}
