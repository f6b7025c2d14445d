//! # Errors
//!
//! Error taxonomy shared by every sealing operation.
//!
//! All of these errors abort the run they occur in. The binary maps
//! [`SealError::UnsealedSecret`] to a reportable verification failure and
//! everything else to a hard error.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::CryptoError;

/// Top-level sealing errors.
#[derive(Debug, Error)]
pub enum SealError {
    /// Configuration file is missing, unparseable or contradictory.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    /// A sealing rule names no certificate source at all.
    #[error("sealing rule {rule} has no certificate source configured (kubernetes, url or path)")]
    NoSourceConfigured { rule: usize },
    /// Stored document scope diverges from the configured rule scope.
    #[error(
        "old secrets are limited to secret {field} '{stored}', but the configured {field} is '{configured}'; re-encryption is needed"
    )]
    ScopeMismatch {
        field: &'static str,
        stored: String,
        configured: String,
    },
    /// No parseable certificate in the provided bytes.
    #[error("certificate unreadable: {0}")]
    CertificateUnreadable(String),
    /// A freshly fetched certificate is outside its validity window.
    #[error("certificate fetched from {0} is outside its validity window")]
    CertificateExpired(String),
    /// Network, file or cluster access failed.
    #[error("failed to fetch from {source_name}: {reason}")]
    FetchFailed { source_name: String, reason: String },
    /// The configured source answered, but has nothing at the location.
    #[error("not found: {0}")]
    NotFound(String),
    /// Verification found a value that should be sealed.
    #[error("key `{key}` is not sealed")]
    UnsealedSecret { key: String },
    /// A sealed value could not be recovered during resealing.
    #[error("failed to decrypt value of `{key}`: {reason}")]
    DecryptFailed { key: String, reason: String },
    /// Resealing needs private keys, which only a cluster source provides.
    #[error("resealing works only with a kubernetes certificate source (rule {rule} uses {kind})")]
    UnsupportedSource { rule: usize, kind: &'static str },
    /// The YAML file holds more than one document.
    #[error("sealing yaml files with more than one document is not supported")]
    MultiDocumentUnsupported,
    /// The YAML document has a shape the value tree cannot represent.
    #[error("unsupported document: {0}")]
    UnsupportedDocument(String),
    /// Init refuses to overwrite an existing configuration.
    #[error("config file {} exists already", .0.display())]
    ConfigExists(PathBuf),
    /// Error raised while processing one file of a run.
    #[error("in file {}: {source}", path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<SealError>,
    },
    /// Cryptography failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// YAML syntax error.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    /// UTF-8 conversion error.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl SealError {
    /// Attach the file being processed to an error.
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        Self::InFile {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// True when the error (or the error it wraps) is a verification failure.
    pub fn is_unsealed(&self) -> bool {
        match self {
            Self::UnsealedSecret { .. } => true,
            Self::InFile { source, .. } => source.is_unsealed(),
            _ => false,
        }
    }

    /// Innermost error, skipping file context.
    pub fn root(&self) -> &SealError {
        match self {
            Self::InFile { source, .. } => source.root(),
            other => other,
        }
    }
}

/// A typed result used across the crate.
pub type Result<T> = std::result::Result<T, SealError>;
