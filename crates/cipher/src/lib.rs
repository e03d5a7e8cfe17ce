//! BDTP CID cipher
//!
//! Asymmetric gating of a content identifier: the seller encrypts the CID to
//! the buyer's RSA public key, and only the matching private key can recover
//! it. RSA-OAEP with SHA-256 over 2048-bit keys, SPKI-encoded public keys and
//! PKCS8-encoded private keys, both PEM; ciphertext travels as base64.
//!
//! Failure is always explicit: a malformed key, an oversized plaintext, or an
//! OAEP validation failure each surface as their own error. No code path
//! substitutes a synthetic CID or a best-effort plaintext.

#![deny(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use thiserror::Error;

/// RSA modulus size used throughout the platform.
pub const KEY_BITS: usize = 2048;

/// OAEP overhead for SHA-256: two hash lengths plus two bytes.
const OAEP_OVERHEAD: usize = 2 * 32 + 2;

/// Cipher-related errors
#[derive(Debug, Error)]
pub enum CipherError {
    /// The supplied key is not a valid PEM-encoded RSA key of the expected
    /// encoding (SPKI for public, PKCS8 for private), or its modulus is too
    /// small to carry an OAEP payload.
    #[error("malformed key: {0}")]
    MalformedKey(String),

    /// The ciphertext is not valid base64.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// The plaintext exceeds the RSA-OAEP capacity for the modulus size.
    /// CIDs are far below the 190-byte limit, so hitting this means the
    /// input is not a CID at all.
    #[error("plaintext of {len} bytes exceeds OAEP capacity of {capacity} bytes")]
    PlaintextTooLarge { len: usize, capacity: usize },

    /// OAEP padding validation failed on decrypt: wrong private key or
    /// corrupted ciphertext. Indistinguishable by design, and never masked.
    #[error("key mismatch: ciphertext not decryptable with the supplied key")]
    KeyMismatch,

    /// The recovered plaintext is not valid UTF-8.
    #[error("decrypted bytes are not a UTF-8 CID string")]
    NotUtf8,

    /// Key generation or encryption failed inside the RSA backend.
    #[error("rsa backend error: {0}")]
    Backend(String),
}

/// Result type alias for cipher operations
pub type CipherResult<T> = Result<T, CipherError>;

/// A freshly generated RSA keypair in the platform's wire encodings.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// SPKI-encoded public key, PEM.
    pub public_pem: String,
    /// PKCS8-encoded private key, PEM.
    pub private_pem: String,
}

/// Generate a 2048-bit RSA keypair (SPKI public / PKCS8 private, PEM).
pub fn generate_keypair() -> CipherResult<KeyPair> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS)
        .map_err(|e| CipherError::Backend(e.to_string()))?;
    let public = RsaPublicKey::from(&private);

    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CipherError::Backend(e.to_string()))?;
    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CipherError::Backend(e.to_string()))?
        .to_string();

    Ok(KeyPair {
        public_pem,
        private_pem,
    })
}

/// Encrypt a CID string to a recipient public key.
///
/// Returns the base64-encoded RSA-OAEP(SHA-256) ciphertext. Fails on a
/// malformed key or an oversized plaintext instead of producing output.
pub fn encrypt_cid(cid: &str, recipient_public_pem: &str) -> CipherResult<String> {
    let public = parse_public_key(recipient_public_pem)?;

    let capacity = public
        .size()
        .checked_sub(OAEP_OVERHEAD)
        .ok_or_else(|| CipherError::MalformedKey("modulus too small for OAEP".to_string()))?;
    if cid.len() > capacity {
        return Err(CipherError::PlaintextTooLarge {
            len: cid.len(),
            capacity,
        });
    }

    let mut rng = rand::thread_rng();
    let ciphertext = public
        .encrypt(&mut rng, Oaep::new::<Sha256>(), cid.as_bytes())
        .map_err(|e| CipherError::Backend(e.to_string()))?;

    Ok(BASE64.encode(ciphertext))
}

/// Decrypt a base64 ciphertext back to the CID string.
///
/// Any OAEP validation failure is reported as `KeyMismatch`; partial or
/// best-effort plaintext is never returned.
pub fn decrypt_cid(ciphertext_b64: &str, private_pem: &str) -> CipherResult<String> {
    let private = RsaPrivateKey::from_pkcs8_pem(private_pem)
        .map_err(|e| CipherError::MalformedKey(e.to_string()))?;

    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| CipherError::MalformedCiphertext(e.to_string()))?;

    let plaintext = private
        .decrypt(Oaep::new::<Sha256>(), &ciphertext)
        .map_err(|_| CipherError::KeyMismatch)?;

    String::from_utf8(plaintext).map_err(|_| CipherError::NotUtf8)
}

/// SHA-256 fingerprint of an SPKI public key, lowercase hex.
///
/// Identifies the recipient of an encrypted pointer without carrying the
/// whole key around.
pub fn key_fingerprint(public_pem: &str) -> CipherResult<String> {
    let public = parse_public_key(public_pem)?;
    let der = public
        .to_public_key_der()
        .map_err(|e| CipherError::Backend(e.to_string()))?;

    let digest = Sha256::digest(der.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    Ok(out)
}

fn parse_public_key(pem: &str) -> CipherResult<RsaPublicKey> {
    let public = RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| CipherError::MalformedKey(e.to_string()))?;
    // Undersized moduli cannot carry an OAEP payload; reject them here so
    // every caller (fingerprinting included) refuses the key up front.
    if public.size() * 8 < KEY_BITS {
        return Err(CipherError::MalformedKey(format!(
            "RSA modulus must be at least {KEY_BITS} bits"
        )));
    }
    Ok(public)
}
