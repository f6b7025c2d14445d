//! # Sealing
//!
//! [`Sealer`] encrypts and verifies values of one document for one rule.

use chrono::Utc;
use regex::Regex;
use rsa::RsaPublicKey;
use tracing::{debug, warn};

use super::{is_sealed, now_rfc3339, seal_value, warn_suspicious, CertRefresh, Scope};
use crate::cert::{classify, CertStatus, CertificateProvider};
use crate::config::SealingRuleSet;
use crate::crypto::parse_first_certificate;
use crate::error::{Result, SealError};
use crate::values::{Metadata, Scalar};

/// Seals and verifies the values of one document
pub struct Sealer<'m> {
    secrets: Regex,
    public_key: RsaPublicKey,
    label: String,
    metadata: &'m mut Metadata,
    sealed: usize,
}

impl<'m> Sealer<'m> {
    /// Bind a rule to a document's metadata.
    ///
    /// A document without metadata adopts the rule's scope and a freshly
    /// fetched certificate. A document with metadata must have the same
    /// scope as the rule; its stored certificate is replaced according to
    /// `refresh`.
    pub fn new(
        rule: &SealingRuleSet,
        metadata: &'m mut Metadata,
        provider: &dyn CertificateProvider,
        refresh: CertRefresh,
    ) -> Result<Self> {
        if metadata.is_empty() {
            debug!("File was never sealed before, init metadata block");
            metadata.name.clone_from(&rule.scope.name);
            metadata.namespace.clone_from(&rule.scope.namespace);
            metadata.cert = fetch_fresh_certificate(rule, provider)?;
        } else {
            debug!("File has sealed values and a metadata block");
            check_scope(&rule.scope, metadata)?;

            if needs_fetch(rule, metadata, refresh)? {
                metadata.cert = fetch_fresh_certificate(rule, provider)?;
            }
        }

        let public_key = parse_first_certificate(metadata.cert.as_bytes())
            .map_err(SealError::CertificateUnreadable)?
            .public_key;
        let scope = Scope::of(metadata);
        debug!("Sealing values for {}", scope);

        Ok(Self {
            secrets: rule.secrets_pattern.clone(),
            public_key,
            label: scope.label(),
            metadata,
            sealed: 0,
        })
    }

    fn needs_sealing(&self, key: &str, value: &Scalar) -> bool {
        if !self.secrets.is_match(key) {
            debug!("`{}` did not match regex {}", key, self.secrets.as_str());
            return false;
        }
        if is_sealed(value.value()) {
            debug!("Value of `{}` was already sealed", key);
            return false;
        }
        true
    }

    /// Seal `value` when `key` matches and the value is still plaintext
    pub fn seal(&mut self, key: &str, value: &mut Scalar) -> Result<()> {
        if !self.needs_sealing(key, value) {
            return Ok(());
        }

        warn_suspicious(key, value.value());
        let sealed = seal_value(&self.public_key, value.value(), &self.label)?;
        value.set_value(sealed);
        self.metadata.sealed_at = now_rfc3339();
        self.sealed += 1;
        debug!("Sealed value of `{}`", key);
        Ok(())
    }

    /// Fail with [`SealError::UnsealedSecret`] when `value` should be sealed
    pub fn verify(&self, key: &str, value: &Scalar) -> Result<()> {
        if self.needs_sealing(key, value) {
            return Err(SealError::UnsealedSecret {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Number of values sealed so far
    pub fn sealed_count(&self) -> usize {
        self.sealed
    }
}

/// Stored scope fields must equal the rule's when they are set
fn check_scope(rule_scope: &Scope, metadata: &Metadata) -> Result<()> {
    if !metadata.name.is_empty() && metadata.name != rule_scope.name {
        return Err(SealError::ScopeMismatch {
            field: "name",
            stored: metadata.name.clone(),
            configured: rule_scope.name.clone(),
        });
    }
    if !metadata.namespace.is_empty() && metadata.namespace != rule_scope.namespace {
        return Err(SealError::ScopeMismatch {
            field: "namespace",
            stored: metadata.namespace.clone(),
            configured: rule_scope.namespace.clone(),
        });
    }
    Ok(())
}

fn needs_fetch(rule: &SealingRuleSet, metadata: &Metadata, refresh: CertRefresh) -> Result<bool> {
    if refresh == CertRefresh::Always {
        debug!("Fresh certificate requested");
        return Ok(true);
    }
    if metadata.cert.trim().is_empty() {
        return Err(SealError::CertificateUnreadable(
            "no certificate stored in the sealit metadata".to_string(),
        ));
    }

    let status = classify(metadata.cert.as_bytes(), rule.max_cert_age, Utc::now())?;
    debug!("Stored certificate is {}", status);
    Ok(match (status, refresh) {
        (CertStatus::Valid, _) => false,
        (CertStatus::Deprecated, CertRefresh::KeepDeprecated) => {
            warn!("⚠️  Sealing with deprecated certificate, a fresh one was not requested");
            false
        }
        _ => true,
    })
}

/// Fetch the rule's certificate; a certificate outside its validity window is refused
fn fetch_fresh_certificate(
    rule: &SealingRuleSet,
    provider: &dyn CertificateProvider,
) -> Result<String> {
    debug!("Requesting a fresh certificate for sealing rule {}", rule.index);
    let bytes = provider.fetch_certificate(&rule.source)?;

    match classify(&bytes, rule.max_cert_age, Utc::now())? {
        CertStatus::Invalid => {
            return Err(SealError::CertificateExpired(rule.source.to_string()));
        }
        CertStatus::Deprecated => warn!(
            "⚠️  Certificate from {} is older than the maximum age {:?}",
            rule.source, rule.max_cert_age
        ),
        CertStatus::Valid => {}
    }

    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use base64::{engine::general_purpose::STANDARD, Engine as _};

    use super::*;
    use crate::config::{CertSpec, RuleSpec, SourcesSpec};
    use crate::constants::SEALED_PREFIX;
    use crate::crypto::{hybrid_decrypt, parse_private_key};
    use crate::test_support::{FakeProvider, CERT_A, CERT_B, CERT_EXPIRED, KEY_A};
    use crate::values::ScalarStyle;

    fn rule(name: &str, namespace: &str, max_age: Option<&str>) -> SealingRuleSet {
        RuleSpec {
            file_regex: "yaml$".to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            secrets_regex: "(password|pin)$".to_string(),
            cert: Some(CertSpec {
                max_age: max_age.map(|age| crate::config::spec::MaxAgeSpec::Text(age.to_string())),
                sources: Some(SourcesSpec {
                    path: Some("cert.pem".to_string()),
                    ..SourcesSpec::default()
                }),
            }),
        }
        .validate(0)
        .unwrap()
    }

    fn scalar(value: &str) -> Scalar {
        Scalar::new(value.to_string(), ScalarStyle::Plain, 0..value.len(), false)
    }

    fn decrypt(sealed: &str, label: &str) -> String {
        let key = parse_private_key(KEY_A).unwrap();
        let keys = BTreeMap::from([("a".to_string(), key)]);
        let ciphertext = STANDARD
            .decode(sealed.strip_prefix(SEALED_PREFIX).unwrap())
            .unwrap();
        String::from_utf8(hybrid_decrypt(&keys, &ciphertext, label).unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_seal_secret_value() {
        let rule = rule("secret", "default", None);
        let provider = FakeProvider::with_certificate(&rule.source, CERT_A);
        let mut metadata = Metadata::default();
        let mut sealer =
            Sealer::new(&rule, &mut metadata, &provider, CertRefresh::WhenStale).unwrap();

        let mut value = scalar("secret!");
        sealer.seal("test_password", &mut value).unwrap();

        assert!(value.value().starts_with(SEALED_PREFIX));
        assert!(!value.value().contains("secret!"));
        assert_eq!(decrypt(value.value(), "default/secret"), "secret!");
        assert_eq!(sealer.sealed_count(), 1);

        assert_eq!(metadata.name, "secret");
        assert_eq!(metadata.namespace, "default");
        assert_eq!(metadata.cert, CERT_A);
        assert!(!metadata.sealed_at.is_empty());
    }

    #[test]
    fn test_seal_is_idempotent_and_ignores_other_keys() {
        let rule = rule("secret", "default", None);
        let provider = FakeProvider::with_certificate(&rule.source, CERT_A);
        let mut metadata = Metadata::default();
        let mut sealer =
            Sealer::new(&rule, &mut metadata, &provider, CertRefresh::WhenStale).unwrap();

        let mut sealed = scalar("ENC:secret!");
        sealer.seal("test_password", &mut sealed).unwrap();
        assert_eq!(sealed.value(), "ENC:secret!");
        assert!(!sealed.is_modified());

        let mut other = scalar("secret!");
        sealer.seal("test", &mut other).unwrap();
        assert_eq!(other.value(), "secret!");

        assert_eq!(sealer.sealed_count(), 0);
        assert!(metadata.sealed_at.is_empty());
    }

    #[test]
    fn test_seal_cluster_wide_scope_uses_empty_label() {
        let rule = rule("", "", None);
        let provider = FakeProvider::with_certificate(&rule.source, CERT_A);
        let mut metadata = Metadata::default();
        let mut sealer =
            Sealer::new(&rule, &mut metadata, &provider, CertRefresh::WhenStale).unwrap();

        let mut value = scalar("1234");
        sealer.seal("pin", &mut value).unwrap();
        assert_eq!(decrypt(value.value(), ""), "1234");
    }

    #[test]
    fn test_verify() {
        let rule = rule("secret", "default", None);
        let provider = FakeProvider::with_certificate(&rule.source, CERT_A);
        let mut metadata = Metadata::default();
        let sealer = Sealer::new(&rule, &mut metadata, &provider, CertRefresh::WhenStale).unwrap();

        let err = sealer
            .verify("test_password", &scalar("secret!"))
            .unwrap_err();
        assert!(matches!(err, SealError::UnsealedSecret { key } if key == "test_password"));

        assert!(sealer.verify("test_password", &scalar("ENC:x")).is_ok());
        assert!(sealer.verify("username", &scalar("john")).is_ok());
    }

    #[test]
    fn test_scope_mismatch() {
        let rule = rule("other", "default", None);
        let provider = FakeProvider::with_certificate(&rule.source, CERT_A);

        let test_cases = vec![
            (("secret", "default"), "name"),
            (("other", "kube-system"), "namespace"),
        ];
        for ((name, namespace), field) in test_cases {
            let mut metadata = Metadata {
                name: name.to_string(),
                namespace: namespace.to_string(),
                sealed_at: String::new(),
                cert: CERT_A.to_string(),
            };
            let result = Sealer::new(&rule, &mut metadata, &provider, CertRefresh::WhenStale);
            assert!(
                matches!(result, Err(SealError::ScopeMismatch { field: f, .. }) if f == field),
                "stored {name}/{namespace} should mismatch on {field}"
            );
        }
        assert_eq!(provider.fetch_count(), 0);
    }

    #[test]
    fn test_stored_scope_fields_left_empty_are_not_enforced() {
        let rule = rule("secret", "default", None);
        let provider = FakeProvider::with_certificate(&rule.source, CERT_B);
        let mut metadata = Metadata {
            namespace: "default".to_string(),
            cert: CERT_A.to_string(),
            ..Metadata::default()
        };
        let mut sealer =
            Sealer::new(&rule, &mut metadata, &provider, CertRefresh::WhenStale).unwrap();

        // the stored namespace-wide scope keeps its label
        let mut value = scalar("secret!");
        sealer.seal("password", &mut value).unwrap();
        assert_eq!(decrypt(value.value(), "default"), "secret!");
    }

    #[test]
    fn test_certificate_refresh_policy() {
        let stored = |cert: &str| Metadata {
            name: "secret".to_string(),
            namespace: "default".to_string(),
            sealed_at: "2020-05-03T23:37:44Z".to_string(),
            cert: cert.to_string(),
        };
        // (stored cert, max age, refresh, fetched)
        let test_cases = vec![
            (CERT_A, None, CertRefresh::WhenStale, false),
            (CERT_A, None, CertRefresh::Always, true),
            (CERT_A, Some("1h"), CertRefresh::WhenStale, true),
            (CERT_A, Some("1h"), CertRefresh::KeepDeprecated, false),
            (CERT_EXPIRED, None, CertRefresh::KeepDeprecated, true),
            ("", None, CertRefresh::Always, true),
        ];

        for (cert, max_age, refresh, fetched) in test_cases {
            let rule = rule("secret", "default", max_age);
            let provider = FakeProvider::with_certificate(&rule.source, CERT_B);
            let mut metadata = stored(cert);

            Sealer::new(&rule, &mut metadata, &provider, refresh).unwrap();

            assert_eq!(
                provider.fetch_count(),
                usize::from(fetched),
                "fetch with {refresh:?} and max age {max_age:?}"
            );
            let expected = if fetched { CERT_B } else { cert };
            assert_eq!(metadata.cert, expected, "cert with {refresh:?}");
        }
    }

    #[test]
    fn test_fetched_certificate_outside_validity_is_refused() {
        let rule = rule("secret", "default", None);
        let provider = FakeProvider::with_certificate(&rule.source, CERT_EXPIRED);
        let mut metadata = Metadata::default();

        let result = Sealer::new(&rule, &mut metadata, &provider, CertRefresh::WhenStale);
        assert!(matches!(result, Err(SealError::CertificateExpired(_))));
    }

    #[test]
    fn test_unreadable_stored_certificate() {
        let rule = rule("secret", "default", None);
        let provider = FakeProvider::with_certificate(&rule.source, CERT_A);
        let mut metadata = Metadata {
            name: "secret".to_string(),
            namespace: "default".to_string(),
            sealed_at: String::new(),
            cert: "not a certificate".to_string(),
        };

        let result = Sealer::new(&rule, &mut metadata, &provider, CertRefresh::WhenStale);
        assert!(matches!(result, Err(SealError::CertificateUnreadable(_))));
    }

    #[test]
    fn test_empty_stored_certificate_is_unreadable() {
        let rule = rule("secret", "default", None);
        let provider = FakeProvider::with_certificate(&rule.source, CERT_A);

        for refresh in [CertRefresh::WhenStale, CertRefresh::KeepDeprecated] {
            let mut metadata = Metadata {
                name: "secret".to_string(),
                namespace: "default".to_string(),
                sealed_at: "2020-05-03T23:37:44Z".to_string(),
                cert: String::new(),
            };

            let result = Sealer::new(&rule, &mut metadata, &provider, refresh);
            assert!(
                matches!(result, Err(SealError::CertificateUnreadable(_))),
                "empty certificate with {refresh:?}"
            );
            assert!(metadata.cert.is_empty());
        }
        assert_eq!(provider.fetch_count(), 0);
    }

    #[test]
    fn test_missing_source_propagates() {
        let rule = rule("secret", "default", None);
        let provider = FakeProvider::default();
        let mut metadata = Metadata::default();

        let result = Sealer::new(&rule, &mut metadata, &provider, CertRefresh::WhenStale);
        assert!(matches!(result, Err(SealError::NotFound(_))));
        assert!(metadata.cert.is_empty());
    }
}
