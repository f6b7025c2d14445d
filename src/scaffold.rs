//! # Scaffolding
//!
//! Files sealit generates for a project: an example configuration
//! (`sealit init`) and a Helm `SealedSecret` template (`sealit template`).

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tracing::info;

use crate::error::{Result, SealError};

/// Example configuration written by `init`
pub const EXAMPLE_CONFIG: &str = r#"# sealit configuration
#
# Every rule binds the files whose name matches `fileRegex` to one secret
# scope. Values whose key matches `secretsRegex` are sealed.
sealingRules:
  - fileRegex: \.dev\.yaml$
    # Leave `name` empty to seal namespace-wide, leave both empty to seal cluster-wide
    name: secret
    namespace: default
    secretsRegex: (password|pin)$
    cert:
      # Fetch a fresh certificate when the stored one is older than this
      maxAge: 720h
      # Exactly one source
      sources:
        kubernetes:
          # Kubeconfig context, the current context when empty
          context: ""
          name: sealed-secrets
          namespace: kube-system
        # url: https://sealed-secrets.example.org/v1/cert.pem
        # path: cert.pem
"#;

/// Helm template of a `SealedSecret` driven by the `sealit` metadata block
pub const SEALED_SECRET_TEMPLATE: &str = r#"apiVersion: bitnami.com/v1alpha1
kind: SealedSecret
metadata:
  {{- if (ne "" .Values.sealit.name) }}
  name: {{ .Values.sealit.name }}
  {{- end }}
  {{- if (ne "" .Values.sealit.namespace) }}
  namespace: {{ .Values.sealit.namespace }}
  {{- end }}
  labels:
    {{- include "sample-chart.labels" . | nindent 4 }}
{{- if or (eq "" .Values.sealit.namespace) (eq "" .Values.sealit.name) }}
  annotations:
  {{- if (eq "" .Values.sealit.namespace) }}
    "sealedsecrets.bitnami.com/cluster-wide": "true"
  {{- else }}
    "sealedsecrets.bitnami.com/namespace-wide": "true"
  {{- end }}
{{- end }}
spec:
  encryptedData:
    # List the sealed values here. Do not forget to trim the "ENC:" prefix!
    #PASSWORD: {{ .Values.env.password | trimPrefix "ENC:" }}
"#;

/// Write the example configuration to `path`.
///
/// Fails with [`SealError::ConfigExists`] when the file exists and `force`
/// is not set.
pub fn write_example_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(SealError::ConfigExists(path.to_path_buf()));
    }
    fs::write(path, EXAMPLE_CONFIG)?;
    info!("✅ Wrote example configuration to {}", path.display());
    Ok(())
}

/// Write the `SealedSecret` template to `path`, or to stdout when `None`
pub fn write_template(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, SEALED_SECRET_TEMPLATE)?;
            info!("✅ Wrote SealedSecret template to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(SEALED_SECRET_TEMPLATE.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
