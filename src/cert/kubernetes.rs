//! # Kubernetes Source
//!
//! Talks to a sealed-secrets controller through the API server:
//! - the active certificate via the service proxy (`/v1/cert.pem`)
//! - every controller key pair via a label-selected `Secret` list

use std::collections::BTreeMap;
use std::path::Path;

use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, warn};

use super::provider::KeySet;
use crate::config::ClusterSource;
use crate::constants::{
    CONTROLLER_CERT_PATH, SEALED_SECRETS_KEY_LABEL, TLS_CERT_KEY, TLS_PRIVATE_KEY,
};
use crate::crypto::{parse_first_certificate, parse_private_key, public_key_fingerprint};
use crate::error::{Result, SealError};

/// Build a client for the source's context, from an explicit kubeconfig if given
async fn client(kubeconfig: Option<&Path>, source: &ClusterSource) -> Result<Client> {
    let failed = |reason: String| SealError::FetchFailed {
        source_name: format!("kubernetes service {source}"),
        reason,
    };
    let options = KubeConfigOptions {
        context: source.context.clone(),
        ..KubeConfigOptions::default()
    };

    let config = match kubeconfig {
        Some(path) => {
            debug!("Load kubeconfig from {}", path.display());
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                failed(format!("cannot read kubeconfig {}: {e}", path.display()))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &options).await
        }
        None => Config::from_kubeconfig(&options).await,
    }
    .map_err(|e| failed(format!("failed to load kubeconfig: {e}")))?;

    Client::try_from(config).map_err(|e| failed(format!("failed to create client: {e}")))
}

/// GET the controller certificate through the API server service proxy
pub async fn fetch_certificate(
    kubeconfig: Option<&Path>,
    source: &ClusterSource,
) -> Result<Vec<u8>> {
    let client = client(kubeconfig, source).await?;
    let uri = format!(
        "/api/v1/namespaces/{}/services/http:{}:/proxy{CONTROLLER_CERT_PATH}",
        source.namespace, source.service_name
    );
    debug!("GET {uri}");

    let request = http::Request::get(&uri)
        .header(http::header::ACCEPT, "application/x-pem-file, */*")
        .body(Vec::new())
        .map_err(|e| SealError::FetchFailed {
            source_name: uri.clone(),
            reason: e.to_string(),
        })?;

    match client.request_text(request).await {
        Ok(pem) => Ok(pem.into_bytes()),
        Err(kube::Error::Api(e)) if e.code == 404 => Err(SealError::NotFound(format!(
            "sealed-secrets service {source}"
        ))),
        Err(e) => Err(SealError::FetchFailed {
            source_name: format!("kubernetes service {source}"),
            reason: e.to_string(),
        }),
    }
}

/// List every controller key pair, oldest first.
///
/// All private keys become decryption candidates; the newest certificate
/// is the one new values are sealed for.
pub async fn fetch_key_set(kubeconfig: Option<&Path>, source: &ClusterSource) -> Result<KeySet> {
    let client = client(kubeconfig, source).await?;
    let secrets: Api<Secret> = Api::namespaced(client, &source.namespace);

    let mut items = match secrets
        .list(&ListParams::default().labels(SEALED_SECRETS_KEY_LABEL))
        .await
    {
        Ok(list) => list.items,
        Err(kube::Error::Api(e)) if e.code == 404 => Vec::new(),
        Err(e) => {
            return Err(SealError::FetchFailed {
                source_name: format!("secrets in namespace {}", source.namespace),
                reason: e.to_string(),
            })
        }
    };
    items.sort_by(|a, b| {
        a.metadata
            .creation_timestamp
            .cmp(&b.metadata.creation_timestamp)
    });

    let mut private_keys = BTreeMap::new();
    let mut newest_certificate = None;
    for secret in &items {
        let name = secret.metadata.name.as_deref().unwrap_or("<unknown>");
        let data = secret.data.clone().unwrap_or_default();

        let Some(key_pem) = data.get(TLS_PRIVATE_KEY) else {
            warn!("⚠️  Secret {name} has no {TLS_PRIVATE_KEY}, skipping");
            continue;
        };
        let key_pem = String::from_utf8(key_pem.0.clone())?;
        let private_key = parse_private_key(&key_pem)?;
        let fingerprint = public_key_fingerprint(&private_key.to_public_key())?;
        debug!("Loaded sealing key {name} ({fingerprint})");
        private_keys.insert(fingerprint, private_key);

        if let Some(cert_pem) = data.get(TLS_CERT_KEY) {
            newest_certificate = Some(String::from_utf8(cert_pem.0.clone())?);
        }
    }

    let certificate = newest_certificate.ok_or_else(|| {
        SealError::NotFound(format!(
            "sealed-secrets keys labelled {SEALED_SECRETS_KEY_LABEL} in namespace {}",
            source.namespace
        ))
    })?;
    let public_key = parse_first_certificate(certificate.as_bytes())
        .map_err(SealError::CertificateUnreadable)?
        .public_key;

    Ok(KeySet {
        private_keys,
        public_key,
        certificate,
    })
}
