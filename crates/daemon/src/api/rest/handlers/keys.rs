//! Keypair generation handler

use crate::error::{ApiError, ApiResult};
use axum::Json;
use serde::Serialize;

/// Generated keypair response
#[derive(Debug, Serialize)]
pub struct GenerateKeysResponse {
    /// SPKI public key, PEM.
    pub public_pem: String,
    /// PKCS8 private key, PEM. Returned once; the daemon keeps no copy.
    pub private_pem: String,
    /// SHA-256 fingerprint of the public key.
    pub fingerprint: String,
}

/// Generate a fresh RSA keypair for a buyer
pub async fn generate_keys() -> ApiResult<Json<GenerateKeysResponse>> {
    // Keygen is CPU-bound; keep it off the async workers.
    let keys = tokio::task::spawn_blocking(bdtp_cipher::generate_keypair)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let fingerprint = bdtp_cipher::key_fingerprint(&keys.public_pem)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(GenerateKeysResponse {
        public_pem: keys.public_pem,
        private_pem: keys.private_pem,
        fingerprint,
    }))
}
