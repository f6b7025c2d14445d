//! # sealit
//!
//! Selectively seal the secret values of YAML files with sealed-secrets
//! compatible hybrid encryption, leaving the rest of each file readable.
//!
//! ## Features
//!
//! - **Rules**: `.sealit.yaml` binds file name patterns to a secret scope,
//!   a key pattern and a certificate source
//! - **Certificates**: fetched from a local path, a URL or a sealed-secrets
//!   controller, stored per file and refreshed when they age out
//! - **Sealing**: matching values become `ENC:<base64>`; comments and
//!   formatting of the file are preserved
//! - **Verification**: CI-friendly check that nothing matching is plaintext
//! - **Resealing**: key rotation and scope migration with cluster keys

pub mod cert;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod scaffold;
pub mod sealer;
pub mod values;

#[cfg(test)]
mod test_support;

pub use cert::{CertStatus, CertificateProvider, KeySet, SourceFetcher};
pub use config::{CertSource, ClusterSource, SealingRuleSet, SealitConfig, Settings};
pub use engine::{Engine, FileReport, RunReport};
pub use error::{Result, SealError};
pub use matcher::{FileMatch, RuleMatcher};
pub use sealer::{CertRefresh, Resealer, Scope, ScopeKind, Sealer};
pub use values::{Metadata, ValueTree, ValuesFile};
