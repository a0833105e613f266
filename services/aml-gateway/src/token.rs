//! Signed report links
//!
//! Token: `base64url("<key>:<expiry unix seconds>") "." base64url(tag)`, where
//! the tag is a keyed BLAKE3 hash of the first part. Key and expiry cannot
//! be altered without the secret.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use thiserror::Error;

const KEY_CONTEXT: &str = "aml-gateway 2026 report link signing key";

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,
}

pub struct ReportTokenSigner {
    key: [u8; blake3::KEY_LEN],
}

impl ReportTokenSigner {
    /// Secrets of any length are stretched to a 256-bit MAC key
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_ref()),
        }
    }

    pub fn sign(&self, key: &str, expires_at: DateTime<Utc>) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!("{}:{}", key, expires_at.timestamp()));
        let signature = URL_SAFE_NO_PAD.encode(self.tag(payload.as_bytes()).as_bytes());
        format!("{}.{}", payload, signature)
    }

    /// Recover the blob key; the signature is checked before the expiry
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let signature: [u8; blake3::OUT_LEN] = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?
            .try_into()
            .map_err(|_| TokenError::InvalidSignature)?;

        // Hash equality is constant-time
        if self.tag(payload.as_bytes()) != blake3::Hash::from(signature) {
            return Err(TokenError::InvalidSignature);
        }

        let decoded = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let decoded = String::from_utf8(decoded).map_err(|_| TokenError::Malformed)?;
        let (key, expiry) = decoded.rsplit_once(':').ok_or(TokenError::Malformed)?;
        let expiry: i64 = expiry.parse().map_err(|_| TokenError::Malformed)?;

        if key.is_empty() {
            return Err(TokenError::Malformed);
        }
        if now.timestamp() > expiry {
            return Err(TokenError::Expired);
        }
        Ok(key.to_string())
    }

    fn tag(&self, data: &[u8]) -> blake3::Hash {
        blake3::keyed_hash(&self.key, data)
    }
}
