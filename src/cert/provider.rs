//! # Certificate Provider
//!
//! Uniform `fetch -> bytes` contract over the three certificate sources.
//!
//! Only the source selected at configuration time is ever tried; a failing
//! source never falls back to another one.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use rsa::{RsaPrivateKey, RsaPublicKey};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::kubernetes;
use crate::config::{CertSource, ClusterSource};
use crate::error::{Result, SealError};

/// Private and public key material of a sealed-secrets controller
pub struct KeySet {
    /// Every controller key, keyed by public key fingerprint; all are decryption candidates
    pub private_keys: BTreeMap<String, RsaPrivateKey>,
    /// Public key of the newest controller certificate
    pub public_key: RsaPublicKey,
    /// PEM text of the newest controller certificate
    pub certificate: String,
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("fingerprints", &self.private_keys.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Source of certificates and, for clusters, private keys
pub trait CertificateProvider {
    /// Fetch the PEM certificate served by `source`
    fn fetch_certificate(&self, source: &CertSource) -> Result<Vec<u8>>;

    /// Fetch every controller key pair from a cluster
    fn fetch_key_set(&self, source: &ClusterSource) -> Result<KeySet>;
}

/// Production provider: local files, HTTP(S) and Kubernetes
///
/// Owns a current-thread runtime so sealing stays synchronous; every fetch
/// blocks until the network call completes.
#[derive(Debug)]
pub struct SourceFetcher {
    runtime: Runtime,
    kubeconfig: Option<PathBuf>,
    base_dir: PathBuf,
}

impl SourceFetcher {
    /// Create a fetcher resolving relative paths against `base_dir`
    pub fn new(kubeconfig: Option<PathBuf>, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            kubeconfig,
            base_dir: base_dir.into(),
        })
    }

    fn fetch_path(&self, path: &Path) -> Result<Vec<u8>> {
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        debug!("Read certificate from {}", resolved.display());

        std::fs::read(&resolved).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SealError::NotFound(resolved.display().to_string())
            } else {
                SealError::FetchFailed {
                    source_name: resolved.display().to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }

    fn fetch_url(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetch certificate from {url}");
        let failed = |reason: String| SealError::FetchFailed {
            source_name: url.to_string(),
            reason,
        };

        self.runtime.block_on(async {
            let response = reqwest::get(url).await.map_err(|e| failed(e.to_string()))?;
            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(SealError::NotFound(url.to_string()));
            }
            if !status.is_success() {
                return Err(failed(format!("HTTP {status}")));
            }
            let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;
            Ok(body.to_vec())
        })
    }
}

impl CertificateProvider for SourceFetcher {
    fn fetch_certificate(&self, source: &CertSource) -> Result<Vec<u8>> {
        info!("Fetching certificate from {source}");
        match source {
            CertSource::Cluster(cluster) => self.runtime.block_on(kubernetes::fetch_certificate(
                self.kubeconfig.as_deref(),
                cluster,
            )),
            CertSource::Url(url) => self.fetch_url(url),
            CertSource::Path(path) => self.fetch_path(path),
        }
    }

    fn fetch_key_set(&self, source: &ClusterSource) -> Result<KeySet> {
        info!("Fetching sealing keys from {source}");
        self.runtime
            .block_on(kubernetes::fetch_key_set(self.kubeconfig.as_deref(), source))
    }
}
