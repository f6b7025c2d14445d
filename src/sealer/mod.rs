//! # Sealer
//!
//! Stateful operators bound to one sealing rule and one document's metadata.
//!
//! ## Features
//!
//! - **Seal**: encrypt matching plaintext values, idempotent on sealed values
//! - **Verify**: fail on the first matching value that is still plaintext
//! - **Reseal**: decrypt with every historical cluster key, re-encrypt under
//!   the current key and the rule's scope
//! - **Certificate refresh**: stored certificates are reused until they age
//!   out, see [`CertRefresh`]

mod resealer;
mod scope;
#[allow(clippy::module_inception)]
mod sealer;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{SecondsFormat, Utc};
use rsa::RsaPublicKey;
use tracing::warn;

pub use resealer::Resealer;
pub use scope::{Scope, ScopeKind};
pub use sealer::Sealer;

use crate::constants::SEALED_PREFIX;
use crate::crypto::hybrid_encrypt;
use crate::error::Result;

/// When a Sealer replaces the certificate stored in a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CertRefresh {
    /// Fetch when the stored certificate is missing, deprecated or invalid
    #[default]
    WhenStale,
    /// Always fetch a fresh certificate
    Always,
    /// Keep a deprecated certificate; fetch only when it is missing or invalid
    KeepDeprecated,
}

/// True when the value carries the sealed prefix
pub fn is_sealed(value: &str) -> bool {
    value.starts_with(SEALED_PREFIX)
}

/// Warn about plaintext that is probably an authoring mistake
pub(crate) fn warn_suspicious(key: &str, value: &str) {
    if value.is_empty() {
        warn!("⚠️  Value of `{}` is an empty string", key);
    } else if value != value.trim() {
        warn!("⚠️  Value of `{}` is padded with whitespace", key);
    }
}

/// `ENC:` + base64 of the hybrid envelope
pub(crate) fn seal_value(public_key: &RsaPublicKey, plaintext: &str, label: &str) -> Result<String> {
    let ciphertext = hybrid_encrypt(public_key, plaintext.as_bytes(), label)?;
    Ok(format!("{SEALED_PREFIX}{}", STANDARD.encode(ciphertext)))
}

/// Current time as stored in `sealedAt`
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
