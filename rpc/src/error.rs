//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use certchain_node::ServiceError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("server error: {0}")]
    Server(String),
}

impl RpcError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RpcError::Service(e) => match e {
                ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                ServiceError::DataIntegrity { .. } | ServiceError::InvalidInput(_) => {
                    StatusCode::BAD_REQUEST
                }
                ServiceError::DuplicateId(_) => StatusCode::CONFLICT,
                ServiceError::Network(_)
                | ServiceError::TransactionFailed { .. }
                | ServiceError::TransactionTimeout { .. }
                | ServiceError::Store(_)
                | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            RpcError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        let mut body = json!({ "error": self.to_string() });
        if let RpcError::Service(e) = &self {
            body["retryable"] = json!(e.is_retryable());
            match e {
                ServiceError::TransactionTimeout { tx_hash } => {
                    body["tx_hash"] = json!(tx_hash);
                }
                ServiceError::TransactionFailed {
                    tx_hash: Some(tx_hash),
                    ..
                } => {
                    body["tx_hash"] = json!(tx_hash);
                }
                ServiceError::DataIntegrity { field, .. } => {
                    body["field"] = json!(field);
                }
                _ => {}
            }
        }
        (status, Json(body)).into_response()
    }
}
