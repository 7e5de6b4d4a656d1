//! Request handlers and their JSON bodies.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use certchain_chain::TransactionStatus;
use certchain_node::VerifiedCertificate;
use certchain_store::{AdminRecord, AppliedEvent, CertificateRecord};
use certchain_types::{Address, TxHash};
use serde::{Deserialize, Serialize};

use crate::pagination::{next_cursor, PaginationMeta, PaginationParams};
use crate::{AppState, RpcError};

// ── Certificates ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub id: String,
    pub recipient: String,
    pub course: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub message: String,
    pub tx_hash: TxHash,
}

pub async fn issue_certificate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<IssueRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>, RpcError> {
    let Json(req) = body.map_err(|e| RpcError::InvalidRequest(e.body_text()))?;
    let outcome = state
        .service
        .issue(&req.id, &req.recipient, &req.course)
        .await?;
    Ok(Json(TransactionResponse {
        message: "Certificate issued successfully".into(),
        tx_hash: outcome.tx_hash,
    }))
}

pub async fn revoke_certificate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RevokeRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>, RpcError> {
    let Json(req) = body.map_err(|e| RpcError::InvalidRequest(e.body_text()))?;
    let tx_hash = state.service.revoke(&req.id).await?;
    Ok(Json(TransactionResponse {
        message: "Certificate revoked successfully".into(),
        tx_hash,
    }))
}

pub async fn verify_certificate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<VerifiedCertificate>, RpcError> {
    Ok(Json(state.service.verify(&id).await?))
}

pub async fn list_certificates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CertificateRecord>>, RpcError> {
    Ok(Json(state.service.list_certificates()?))
}

// ── Event feed ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<AppliedEvent>,
    #[serde(flatten)]
    pub pagination: PaginationMeta,
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<EventsResponse>, RpcError> {
    let offset = params.offset().map_err(RpcError::InvalidRequest)?;
    let count = params.effective_count();
    let events = state
        .service
        .list_events(offset as usize, count as usize)?;
    let cursor = next_cursor(offset, events.len(), count);
    Ok(Json(EventsResponse {
        events,
        pagination: PaginationMeta { cursor },
    }))
}

// ── Admins ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AdminRequest {
    pub address: String,
}

fn parse_address(raw: &str) -> Result<Address, RpcError> {
    raw.parse()
        .map_err(|e| RpcError::InvalidRequest(format!("address: {e}")))
}

pub async fn list_admins(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AdminRecord>>, RpcError> {
    Ok(Json(state.service.list_admins()?))
}

pub async fn add_admin(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AdminRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>, RpcError> {
    let Json(req) = body.map_err(|e| RpcError::InvalidRequest(e.body_text()))?;
    let address = parse_address(&req.address)?;
    let tx_hash = state.service.add_admin(&address).await?;
    Ok(Json(TransactionResponse {
        message: "Admin added successfully".into(),
        tx_hash,
    }))
}

pub async fn remove_admin(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<TransactionResponse>, RpcError> {
    let address = parse_address(&address)?;
    let tx_hash = state.service.remove_admin(&address).await?;
    Ok(Json(TransactionResponse {
        message: "Admin removed successfully".into(),
        tx_hash,
    }))
}

// ── Transactions ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub block_number: u64,
    pub success: bool,
    pub gas_used: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionStatusResponse {
    pub tx_hash: TxHash,
    /// `"pending"` or `"mined"`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ReceiptSummary>,
}

pub async fn transaction_status(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<TransactionStatusResponse>, RpcError> {
    let tx_hash: TxHash = hash
        .parse()
        .map_err(|e| RpcError::InvalidRequest(format!("tx hash: {e}")))?;
    let response = match state.service.transaction_status(&tx_hash).await? {
        TransactionStatus::Pending => TransactionStatusResponse {
            tx_hash,
            status: "pending".into(),
            receipt: None,
        },
        TransactionStatus::Mined(receipt) => TransactionStatusResponse {
            tx_hash,
            status: "mined".into(),
            receipt: Some(ReceiptSummary {
                block_number: receipt.block_number,
                success: receipt.success,
                gas_used: receipt.gas_used,
            }),
        },
    };
    Ok(Json(response))
}

// ── Operations ───────────────────────────────────────────────────────────

pub async fn health() -> &'static str {
    "ok"
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, RpcError> {
    let text = state
        .service
        .metrics()
        .encode()
        .map_err(|e| RpcError::Server(e.to_string()))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}
