//! # Crypto
//!
//! The sealed-secrets hybrid envelope and the certificate parsing it needs.
//!
//! ## Envelope
//!
//! ```text
//! u16 BE len(rsa) || RSA-OAEP-SHA256(session key, label) || AES-256-GCM(plaintext)
//! ```
//!
//! The session key is random per value, so the GCM nonce is fixed at zero.
//! The label binds the ciphertext to a scope: decryption with any other
//! label fails.

use std::collections::BTreeMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::pem::Pem;
use zeroize::Zeroizing;

use crate::constants::SESSION_KEY_BYTES;

/// GCM nonce; every session key encrypts exactly one value.
const ZERO_NONCE: [u8; 12] = [0; 12];

/// Failures of the envelope primitives and key parsing.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Ciphertext is shorter than its own length prefix claims.
    #[error("ciphertext is truncated")]
    Truncated,
    /// None of the candidate private keys unwraps the session key.
    #[error("no key could decrypt the value (wrong key or label)")]
    NoMatchingKey,
    /// The symmetric layer rejected the ciphertext.
    #[error("authenticated decryption failed")]
    Cipher,
    /// RSA operation failed.
    #[error("rsa: {0}")]
    Rsa(#[from] rsa::Error),
    /// Certificate or key is not RSA.
    #[error("expected an RSA public key")]
    NotRsa,
    /// PEM private key could not be parsed.
    #[error("unreadable private key: {0}")]
    PrivateKey(String),
    /// Public key could not be DER encoded.
    #[error("public key encoding failed: {0}")]
    Encoding(String),
    /// Wrapped session key does not fit the length prefix.
    #[error("wrapped session key is too large")]
    Oversized,
}

/// The parts of an X.509 certificate sealing needs.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub public_key: RsaPublicKey,
}

/// Encrypt `plaintext` for `public_key`, bound to `label`.
pub fn hybrid_encrypt(
    public_key: &RsaPublicKey,
    plaintext: &[u8],
    label: &str,
) -> Result<Vec<u8>, CryptoError> {
    let mut session_key = Zeroizing::new([0u8; SESSION_KEY_BYTES]);
    OsRng.fill_bytes(session_key.as_mut_slice());

    let wrapped = public_key.encrypt(
        &mut OsRng,
        Oaep::new_with_label::<Sha256, _>(label),
        session_key.as_slice(),
    )?;
    let wrapped_len = u16::try_from(wrapped.len()).map_err(|_| CryptoError::Oversized)?;

    let cipher =
        Aes256Gcm::new_from_slice(session_key.as_slice()).map_err(|_| CryptoError::Cipher)?;
    let sealed = cipher
        .encrypt(Nonce::from_slice(&ZERO_NONCE), plaintext)
        .map_err(|_| CryptoError::Cipher)?;

    let mut out = Vec::with_capacity(2 + wrapped.len() + sealed.len());
    out.extend_from_slice(&wrapped_len.to_be_bytes());
    out.extend_from_slice(&wrapped);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt a hybrid envelope, trying every candidate key.
///
/// The first key that unwraps the session key decides the outcome.
pub fn hybrid_decrypt(
    private_keys: &BTreeMap<String, RsaPrivateKey>,
    ciphertext: &[u8],
    label: &str,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let (prefix, rest) = ciphertext
        .split_first_chunk::<2>()
        .ok_or(CryptoError::Truncated)?;
    let wrapped_len = usize::from(u16::from_be_bytes(*prefix));
    if rest.len() < wrapped_len {
        return Err(CryptoError::Truncated);
    }
    let (wrapped, sealed) = rest.split_at(wrapped_len);

    for private_key in private_keys.values() {
        let Ok(session_key) =
            private_key.decrypt(Oaep::new_with_label::<Sha256, _>(label), wrapped)
        else {
            continue;
        };
        let session_key = Zeroizing::new(session_key);

        let cipher =
            Aes256Gcm::new_from_slice(session_key.as_slice()).map_err(|_| CryptoError::Cipher)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&ZERO_NONCE), sealed)
            .map_err(|_| CryptoError::Cipher)?;
        return Ok(Zeroizing::new(plaintext));
    }

    Err(CryptoError::NoMatchingKey)
}

/// Hex SHA-256 of the DER `SubjectPublicKeyInfo`, the key id sealed-secrets uses.
pub fn public_key_fingerprint(public_key: &RsaPublicKey) -> Result<String, CryptoError> {
    let der = public_key
        .to_public_key_der()
        .map_err(|e| CryptoError::Encoding(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(der.as_bytes())))
}

/// Parse the first certificate of a PEM bundle.
///
/// Non-certificate PEM blocks are skipped. Errors carry a human readable
/// reason, callers wrap it in [`crate::SealError::CertificateUnreadable`].
pub fn parse_first_certificate(pem: &[u8]) -> Result<ParsedCertificate, String> {
    if pem.iter().all(u8::is_ascii_whitespace) {
        return Err("no certificate was provided".to_string());
    }

    for block in Pem::iter_from_buffer(pem) {
        let block = block.map_err(|e| format!("invalid PEM: {e}"))?;
        if block.label != "CERTIFICATE" {
            continue;
        }
        let cert = block
            .parse_x509()
            .map_err(|e| format!("invalid X.509 certificate: {e}"))?;

        let validity = cert.validity();
        let not_before = to_utc(validity.not_before.timestamp())?;
        let not_after = to_utc(validity.not_after.timestamp())?;
        let public_key = RsaPublicKey::from_public_key_der(cert.public_key().raw)
            .map_err(|_| CryptoError::NotRsa.to_string())?;

        return Ok(ParsedCertificate {
            not_before,
            not_after,
            public_key,
        });
    }

    Err("failed to read any certificates".to_string())
}

/// Parse a PEM private key, PKCS#1 first, PKCS#8 as fallback.
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| CryptoError::PrivateKey(e.to_string()))
}

fn to_utc(timestamp: i64) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| format!("certificate timestamp {timestamp} is out of range"))
}
