//! # Certificate Lifecycle
//!
//! Classifies a certificate against its hard validity window and the
//! configured maximum age. Re-evaluated on every seal, never cached.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::crypto::parse_first_certificate;
use crate::error::{Result, SealError};

/// Certificate status at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CertStatus {
    /// Outside `[notBefore, notAfter]`
    Invalid,
    /// Inside the validity window but at or past `notBefore + maxAge`
    Deprecated,
    /// Inside both windows
    Valid,
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Invalid => "invalid",
            Self::Deprecated => "deprecated",
            Self::Valid => "valid",
        })
    }
}

/// Classify the first certificate of a PEM bundle.
///
/// Fails with [`SealError::CertificateUnreadable`] when no certificate parses.
pub fn classify(pem: &[u8], max_age: Duration, now: DateTime<Utc>) -> Result<CertStatus> {
    let cert = parse_first_certificate(pem).map_err(SealError::CertificateUnreadable)?;
    debug!(
        "Cert is valid from {} till {}. Maximum cert age is set to {:?}",
        cert.not_before, cert.not_after, max_age
    );
    Ok(classify_window(
        cert.not_before,
        cert.not_after,
        max_age,
        now,
    ))
}

/// Decision rule over the three timestamps, boundaries inclusive.
pub fn classify_window(
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    max_age: Duration,
    now: DateTime<Utc>,
) -> CertStatus {
    if now < not_before || now > not_after {
        return CertStatus::Invalid;
    }

    // An age limit beyond chrono's range never deprecates
    let deprecated_at = chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| not_before.checked_add_signed(age));

    match deprecated_at {
        Some(deprecated_at) if now >= deprecated_at => CertStatus::Deprecated,
        _ => CertStatus::Valid,
    }
}
