//! Opaque refresh-token values.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const REFRESH_TOKEN_BYTES: usize = 32;

/// Create a new refresh token value.
/// The raw value is only returned to the client; the store keeps a hash.
pub fn generate_refresh_value() -> Result<String> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a presented refresh token so raw values never touch storage.
#[must_use]
pub fn hash_refresh_value(value: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().to_vec()
}

/// Short, non-reversible label for a presented secret (refresh or provider
/// token), used as a rate-limit key when the caller has no known address.
#[must_use]
pub fn fingerprint(value: &str) -> String {
    let digest = hash_refresh_value(value);
    digest.iter().take(8).map(|byte| format!("{byte:02x}")).collect()
}
