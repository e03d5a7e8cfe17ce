//! Local ledger simulation handler
//!
//! Dev-only surface: records a confirmed transfer straight into the
//! in-memory ledger so payment-wait loops can be exercised without a chain.

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{extract::State, Json};
use bdtp_types::{AssetAmount, ChainAddress};
use serde::{Deserialize, Serialize};

/// Record transfer request
#[derive(Debug, Deserialize)]
pub struct RecordTransferRequest {
    pub from: String,
    pub to: String,
    /// Decimal amount string, e.g. "3".
    pub amount: String,
}

/// Record transfer response
#[derive(Debug, Serialize)]
pub struct RecordTransferResponse {
    pub tx_hash: String,
    pub block: Option<u64>,
}

/// Record a confirmed transfer in the local ledger
pub async fn record_transfer(
    State(state): State<AppState>,
    Json(request): Json<RecordTransferRequest>,
) -> ApiResult<Json<RecordTransferResponse>> {
    let from = ChainAddress::parse(&request.from).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let to = ChainAddress::parse(&request.to).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let amount =
        AssetAmount::parse(&request.amount).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let tx = state.ledger.record_transfer(from, to, amount.minor());

    tracing::debug!(tx = %tx, "dev transfer recorded");

    Ok(Json(RecordTransferResponse {
        tx_hash: tx.hash,
        block: tx.block,
    }))
}
