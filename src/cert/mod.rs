//! # Certificates
//!
//! Fetching and classifying sealing certificates.
//!
//! ## Features
//!
//! - **Sources**: local path, URL, or a sealed-secrets controller in a cluster
//! - **Key sets**: private keys of every controller key pair, for resealing
//! - **Lifecycle**: invalid / deprecated / valid classification against `maxAge`

pub mod kubernetes;
pub mod lifecycle;
pub mod provider;

pub use lifecycle::{classify, CertStatus};
pub use provider::{CertificateProvider, KeySet, SourceFetcher};
