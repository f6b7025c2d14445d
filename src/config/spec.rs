//! # Configuration File Model
//!
//! Raw serde model of `.sealit.yaml`. Nothing here is validated; see
//! [`crate::config::validation`] for the compiled form.
//!
//! ```yaml
//! sealingRules:
//!   - fileRegex: \.dev\.yaml$
//!     name: secret
//!     namespace: default
//!     secretsRegex: (password|pin)$
//!     cert:
//!       maxAge: 720h
//!       sources:
//!         kubernetes:
//!           context: kind-dev
//!           name: sealed-secrets
//!           namespace: kube-system
//! ```

use serde::Deserialize;

/// Top-level configuration document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpec {
    /// Sealing rules, applied in declared order
    #[serde(default)]
    pub sealing_rules: Vec<RuleSpec>,
}

/// One sealing rule as written in the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    /// Regular expression matched against file names in the working directory
    #[serde(default)]
    pub file_regex: String,
    /// Secret name the sealed values are bound to (empty for namespace/cluster-wide)
    #[serde(default)]
    pub name: String,
    /// Secret namespace the sealed values are bound to (empty for cluster-wide)
    #[serde(default)]
    pub namespace: String,
    /// Regular expression matched against value keys
    #[serde(default, alias = "encryptRegex")]
    pub secrets_regex: String,
    /// Certificate policy and source
    #[serde(default)]
    pub cert: Option<CertSpec>,
}

/// Certificate block of a rule
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertSpec {
    /// Maximum certificate age, e.g. "720h"
    #[serde(default)]
    pub max_age: Option<MaxAgeSpec>,
    /// Certificate sources; exactly one must be populated
    #[serde(default)]
    pub sources: Option<SourcesSpec>,
}

/// `maxAge` is usually a duration string, integers are nanoseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MaxAgeSpec {
    Text(String),
    Nanoseconds(u64),
}

/// Certificate sources of a rule
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesSpec {
    /// Sealed-secrets controller running in a cluster
    #[serde(default)]
    pub kubernetes: Option<KubernetesSourceSpec>,
    /// HTTP(S) URL serving the certificate
    #[serde(default)]
    pub url: Option<String>,
    /// Local certificate file
    #[serde(default)]
    pub path: Option<String>,
}

/// Sealed-secrets controller service
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSourceSpec {
    /// Kubeconfig context (defaults to the current context)
    #[serde(default)]
    pub context: String,
    /// Controller service name
    #[serde(default)]
    pub name: String,
    /// Controller namespace
    #[serde(default)]
    pub namespace: String,
}

impl KubernetesSourceSpec {
    /// True when no field is populated
    pub fn is_empty(&self) -> bool {
        self.context.trim().is_empty()
            && self.name.trim().is_empty()
            && self.namespace.trim().is_empty()
    }
}
