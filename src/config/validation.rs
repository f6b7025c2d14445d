//! # Rule Validation
//!
//! Compiles [`RuleSpec`]s into immutable [`SealingRuleSet`]s.
//!
//! Validation happens once per run, before any file is touched:
//! - `fileRegex` and `secretsRegex` must be present and compile
//! - `maxAge` must parse (defaults to 720h)
//! - exactly one certificate source must be populated

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use super::duration::parse_duration;
use super::spec::{CertSpec, KubernetesSourceSpec, MaxAgeSpec, RuleSpec};
use crate::constants::DEFAULT_MAX_CERT_AGE;
use crate::error::{Result, SealError};
use crate::sealer::Scope;

/// One validated sealing policy
#[derive(Debug, Clone)]
pub struct SealingRuleSet {
    /// Position in the configuration file, used in messages
    pub index: usize,
    pub file_pattern: Regex,
    pub scope: Scope,
    pub secrets_pattern: Regex,
    pub max_cert_age: Duration,
    pub source: CertSource,
}

/// Where a rule's certificate comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertSource {
    /// Sealed-secrets controller in a cluster; the only source that can reseal
    Cluster(ClusterSource),
    /// HTTP(S) endpoint serving the certificate
    Url(String),
    /// Local file, relative paths resolve against the working directory
    Path(PathBuf),
}

/// Sealed-secrets controller service in a cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSource {
    /// Kubeconfig context, `None` for the current context
    pub context: Option<String>,
    pub service_name: String,
    pub namespace: String,
}

impl CertSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cluster(_) => "kubernetes",
            Self::Url(_) => "url",
            Self::Path(_) => "path",
        }
    }
}

impl fmt::Display for CertSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster(cluster) => write!(f, "kubernetes service {cluster}"),
            Self::Url(url) => write!(f, "url {url}"),
            Self::Path(path) => write!(f, "path {}", path.display()),
        }
    }
}

impl fmt::Display for ClusterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.service_name)?;
        if let Some(context) = &self.context {
            write!(f, " (context {context})")?;
        }
        Ok(())
    }
}

impl SealingRuleSet {
    /// True when the rule applies to a file with this name
    pub fn matches_file(&self, file_name: &str) -> bool {
        self.file_pattern.is_match(file_name)
    }

    /// True when values under this key must be sealed
    pub fn matches_key(&self, key: &str) -> bool {
        self.secrets_pattern.is_match(key)
    }
}

impl RuleSpec {
    /// Validate and compile the rule at `index` (0-based)
    pub fn validate(&self, index: usize) -> Result<SealingRuleSet> {
        let file_pattern = compile(index, "fileRegex", &self.file_regex)?;
        let secrets_pattern = compile(index, "secretsRegex", &self.secrets_regex)?;

        let cert = self.cert.clone().unwrap_or_default();
        let max_cert_age = max_age(index, &cert)?;
        let source = resolve_source(index, &cert)?;

        Ok(SealingRuleSet {
            index,
            file_pattern,
            scope: Scope::new(self.name.trim(), self.namespace.trim()),
            secrets_pattern,
            max_cert_age,
            source,
        })
    }
}

fn compile(index: usize, field: &str, pattern: &str) -> Result<Regex> {
    if pattern.is_empty() {
        return Err(SealError::ConfigInvalid(format!(
            "sealing rule {index}: {field} cannot be empty"
        )));
    }
    Regex::new(pattern).map_err(|e| {
        SealError::ConfigInvalid(format!(
            "sealing rule {index}: {field} '{pattern}' is not a valid regular expression: {e}"
        ))
    })
}

fn max_age(index: usize, cert: &CertSpec) -> Result<Duration> {
    match &cert.max_age {
        None => parse_duration(DEFAULT_MAX_CERT_AGE),
        Some(MaxAgeSpec::Nanoseconds(nanos)) => Ok(Duration::from_nanos(*nanos)),
        Some(MaxAgeSpec::Text(text)) if text.trim().is_empty() => {
            parse_duration(DEFAULT_MAX_CERT_AGE)
        }
        Some(MaxAgeSpec::Text(text)) => parse_duration(text).map_err(|e| {
            SealError::ConfigInvalid(format!("sealing rule {index}: cert.maxAge: {e}"))
        }),
    }
}

/// Pick the populated source, checking cluster, url and path in that order.
///
/// Several populated sources are rejected instead of silently preferring one.
fn resolve_source(index: usize, cert: &CertSpec) -> Result<CertSource> {
    let sources = cert.sources.clone().unwrap_or_default();
    let mut populated = Vec::new();

    if let Some(kubernetes) = sources.kubernetes.filter(|k| !k.is_empty()) {
        populated.push(CertSource::Cluster(cluster_source(index, &kubernetes)?));
    }
    if let Some(url) = non_empty(sources.url) {
        populated.push(CertSource::Url(url));
    }
    if let Some(path) = non_empty(sources.path) {
        populated.push(CertSource::Path(PathBuf::from(path)));
    }

    let mut populated = populated.into_iter();
    match (populated.next(), populated.next()) {
        (None, _) => Err(SealError::NoSourceConfigured { rule: index }),
        (Some(source), None) => Ok(source),
        (Some(first), Some(second)) => Err(SealError::ConfigInvalid(format!(
            "sealing rule {index}: configures both a {} and a {} certificate source; exactly one is allowed",
            first.kind(),
            second.kind()
        ))),
    }
}

fn cluster_source(index: usize, spec: &KubernetesSourceSpec) -> Result<ClusterSource> {
    let service_name = spec.name.trim();
    let namespace = spec.namespace.trim();
    if service_name.is_empty() || namespace.is_empty() {
        return Err(SealError::ConfigInvalid(format!(
            "sealing rule {index}: cert.sources.kubernetes needs both name and namespace"
        )));
    }

    let context = spec.context.trim();
    Ok(ClusterSource {
        context: (!context.is_empty()).then(|| context.to_string()),
        service_name: service_name.to_string(),
        namespace: namespace.to_string(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSpec;

    fn rule(yaml: &str) -> RuleSpec {
        let spec: ConfigSpec = serde_yaml::from_str(yaml).unwrap();
        spec.sealing_rules.into_iter().next().unwrap()
    }

    #[test]
    fn test_validate_path_rule() {
        let rule = rule(
            r"
sealingRules:
  - fileRegex: \.dev\.yaml$
    name: secret
    namespace: default
    secretsRegex: (password|pin)$
    cert:
      maxAge: 24h
      sources:
        path: cert.pem
",
        )
        .validate(0)
        .unwrap();

        assert!(rule.matches_file("app.dev.yaml"));
        assert!(!rule.matches_file("app.prod.yaml"));
        assert!(rule.matches_key("test_password"));
        assert!(!rule.matches_key("username"));
        assert_eq!(rule.scope, Scope::new("secret", "default"));
        assert_eq!(rule.max_cert_age, Duration::from_secs(86_400));
        assert_eq!(rule.source, CertSource::Path(PathBuf::from("cert.pem")));
    }

    #[test]
    fn test_validate_defaults_max_age_and_accepts_encrypt_regex() {
        let rule = rule(
            r"
sealingRules:
  - fileRegex: ya?ml$
    encryptRegex: token
    cert:
      sources:
        url: https://example.org/v1/cert.pem
",
        )
        .validate(0)
        .unwrap();

        assert!(rule.matches_key("api_token"));
        assert_eq!(rule.max_cert_age, Duration::from_secs(720 * 3600));
        assert_eq!(rule.scope, Scope::default());
        assert_eq!(rule.source.kind(), "url");
    }

    #[test]
    fn test_validate_kubernetes_source() {
        let rule = rule(
            r"
sealingRules:
  - fileRegex: yaml$
    secretsRegex: password
    cert:
      sources:
        kubernetes:
          name: sealed-secrets
          namespace: kube-system
",
        )
        .validate(0)
        .unwrap();

        assert_eq!(
            rule.source,
            CertSource::Cluster(ClusterSource {
                context: None,
                service_name: "sealed-secrets".to_string(),
                namespace: "kube-system".to_string(),
            })
        );
    }

    #[test]
    fn test_validate_rejects_missing_source() {
        for yaml in [
            "sealingRules:\n  - fileRegex: yaml$\n    secretsRegex: x\n",
            "sealingRules:\n  - fileRegex: yaml$\n    secretsRegex: x\n    cert:\n      sources:\n        url: ''\n        kubernetes: {}\n",
        ] {
            assert!(
                matches!(
                    rule(yaml).validate(3),
                    Err(SealError::NoSourceConfigured { rule: 3 })
                ),
                "{yaml} should have no source"
            );
        }
    }

    #[test]
    fn test_validate_rejects_several_sources() {
        let err = rule(
            r"
sealingRules:
  - fileRegex: yaml$
    secretsRegex: x
    cert:
      sources:
        url: https://example.org
        path: cert.pem
",
        )
        .validate(0)
        .unwrap_err();

        assert!(matches!(&err, SealError::ConfigInvalid(msg) if msg.contains("url") && msg.contains("path")));
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let invalid_rules = vec![
            // empty secrets pattern would seal every value
            "sealingRules:\n  - fileRegex: yaml$\n    cert: {sources: {path: c.pem}}\n",
            "sealingRules:\n  - fileRegex: '('\n    secretsRegex: x\n    cert: {sources: {path: c.pem}}\n",
            "sealingRules:\n  - fileRegex: yaml$\n    secretsRegex: x\n    cert: {maxAge: forever, sources: {path: c.pem}}\n",
            "sealingRules:\n  - fileRegex: yaml$\n    secretsRegex: x\n    cert: {sources: {kubernetes: {name: sealed-secrets}}}\n",
        ];

        for yaml in invalid_rules {
            assert!(
                matches!(rule(yaml).validate(0), Err(SealError::ConfigInvalid(_))),
                "{yaml} should be invalid"
            );
        }
    }
}
