//! Listing catalog handlers
//!
//! The CID in a listing is the asset being sold: it is accepted on create
//! and never echoed back through the read endpoints.

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use bdtp_engine::{Listing, ListingCatalog};
use bdtp_types::{AssetAmount, ChainAddress, SubjectId};
use serde::{Deserialize, Serialize};

/// Create listing request
#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub subject_id: String,
    /// Decimal price string, e.g. "1.5".
    pub price: String,
    /// Content identifier to reveal after a confirmed purchase.
    pub cid: String,
    pub seller: String,
}

/// Listing response, without the secret CID.
#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub subject_id: String,
    pub price: AssetAmount,
    pub seller: ChainAddress,
}

/// Create or replace a listing
pub async fn create_listing(
    State(state): State<AppState>,
    Json(request): Json<CreateListingRequest>,
) -> ApiResult<Json<ListingResponse>> {
    let price =
        AssetAmount::parse(&request.price).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let seller =
        ChainAddress::parse(&request.seller).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if request.cid.is_empty() {
        return Err(ApiError::BadRequest("cid must not be empty".to_string()));
    }

    let subject = SubjectId::new(request.subject_id.clone());
    state.catalog.list(
        subject,
        Listing {
            price,
            cid: request.cid,
            seller: seller.clone(),
        },
    );

    tracing::info!(subject_id = %request.subject_id, price = %price, "listing created");

    Ok(Json(ListingResponse {
        subject_id: request.subject_id,
        price,
        seller,
    }))
}

/// Get a listing
pub async fn get_listing(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> ApiResult<Json<ListingResponse>> {
    let subject = SubjectId::new(subject_id.clone());
    let listing = state
        .catalog
        .listing(&subject)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("No listing for {}", subject_id)))?;

    Ok(Json(ListingResponse {
        subject_id,
        price: listing.price,
        seller: listing.seller,
    }))
}

/// Delete listing response
#[derive(Debug, Serialize)]
pub struct DeleteListingResponse {
    pub deleted: bool,
}

/// Remove a listing
pub async fn delete_listing(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> ApiResult<Json<DeleteListingResponse>> {
    state.catalog.unlist(&SubjectId::new(subject_id));
    Ok(Json(DeleteListingResponse { deleted: true }))
}
