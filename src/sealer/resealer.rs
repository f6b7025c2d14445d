//! # Resealing
//!
//! [`Resealer`] re-encrypts the sealed values of one document under the
//! newest controller key and the rule's current scope. It is used for key
//! rotation and for scope migration.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use tracing::debug;
use zeroize::Zeroizing;

use super::{is_sealed, now_rfc3339, seal_value, warn_suspicious, Scope};
use crate::cert::{CertificateProvider, KeySet};
use crate::config::{CertSource, SealingRuleSet};
use crate::constants::SEALED_PREFIX;
use crate::crypto::hybrid_decrypt;
use crate::error::{Result, SealError};
use crate::values::{Metadata, Scalar};

/// Decrypts with the historical keys, encrypts with the current one
pub struct Resealer<'m> {
    secrets: Regex,
    keys: KeySet,
    old_label: String,
    new_label: String,
    metadata: &'m mut Metadata,
    resealed: usize,
}

impl<'m> Resealer<'m> {
    /// Fetch the controller key set and move the metadata to the rule's scope.
    ///
    /// Only cluster sources can reseal, since decryption needs private keys.
    pub fn new(
        rule: &SealingRuleSet,
        metadata: &'m mut Metadata,
        provider: &dyn CertificateProvider,
    ) -> Result<Self> {
        let CertSource::Cluster(cluster) = &rule.source else {
            return Err(SealError::UnsupportedSource {
                rule: rule.index,
                kind: rule.source.kind(),
            });
        };

        let keys = provider.fetch_key_set(cluster)?;
        debug!(
            "Fetched {} private key(s) from {}",
            keys.private_keys.len(),
            cluster
        );

        // values sealed before metadata existed can only have used the rule's scope
        let old_scope = if metadata.is_empty() {
            rule.scope.clone()
        } else {
            Scope::of(metadata)
        };
        if old_scope != rule.scope {
            debug!("Migrating scope from {} to {}", old_scope, rule.scope);
        }

        metadata.name.clone_from(&rule.scope.name);
        metadata.namespace.clone_from(&rule.scope.namespace);
        metadata.cert.clone_from(&keys.certificate);

        Ok(Self {
            secrets: rule.secrets_pattern.clone(),
            old_label: old_scope.label(),
            new_label: rule.scope.label(),
            keys,
            metadata,
            resealed: 0,
        })
    }

    /// Re-encrypt `value` when `key` matches; plaintext values are sealed fresh
    pub fn reseal(&mut self, key: &str, value: &mut Scalar) -> Result<()> {
        if !self.secrets.is_match(key) {
            debug!("`{}` did not match regex {}", key, self.secrets.as_str());
            return Ok(());
        }

        let plaintext = if is_sealed(value.value()) {
            let plaintext = self.decrypt(key, value.value())?;
            debug!("Decrypted value of `{}`", key);
            plaintext
        } else {
            Zeroizing::new(value.value().to_string())
        };

        warn_suspicious(key, &plaintext);
        let sealed = seal_value(&self.keys.public_key, &plaintext, &self.new_label)?;
        value.set_value(sealed);
        self.metadata.sealed_at = now_rfc3339();
        self.resealed += 1;
        debug!("Resealed value of `{}`", key);
        Ok(())
    }

    fn decrypt(&self, key: &str, sealed: &str) -> Result<Zeroizing<String>> {
        let failed = |reason: String| SealError::DecryptFailed {
            key: key.to_string(),
            reason,
        };

        let encoded = sealed.strip_prefix(SEALED_PREFIX).unwrap_or(sealed);
        let ciphertext = STANDARD
            .decode(encoded)
            .map_err(|e| failed(format!("invalid base64: {e}")))?;
        let plaintext = hybrid_decrypt(&self.keys.private_keys, &ciphertext, &self.old_label)
            .map_err(|e| failed(e.to_string()))?;
        let plaintext = String::from_utf8(plaintext.to_vec())
            .map_err(|_| failed("plaintext is not valid UTF-8".to_string()))?;
        Ok(Zeroizing::new(plaintext))
    }

    /// Number of values re-encrypted so far
    pub fn resealed_count(&self) -> usize {
        self.resealed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::{CertSpec, ClusterSource, KubernetesSourceSpec, RuleSpec, SourcesSpec};
    use crate::crypto::{hybrid_encrypt, parse_first_certificate, parse_private_key};
    use crate::test_support::{FakeProvider, CERT_A, CERT_B, KEY_A, KEY_B};
    use crate::values::ScalarStyle;

    fn cluster_rule(name: &str, namespace: &str) -> SealingRuleSet {
        RuleSpec {
            file_regex: "yaml$".to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            secrets_regex: "(password|pin)$".to_string(),
            cert: Some(CertSpec {
                max_age: None,
                sources: Some(SourcesSpec {
                    kubernetes: Some(KubernetesSourceSpec {
                        context: String::new(),
                        name: "sealed-secrets".to_string(),
                        namespace: "kube-system".to_string(),
                    }),
                    ..SourcesSpec::default()
                }),
            }),
        }
        .validate(0)
        .unwrap()
    }

    fn cluster(rule: &SealingRuleSet) -> ClusterSource {
        match &rule.source {
            CertSource::Cluster(cluster) => cluster.clone(),
            other => panic!("expected a cluster source, got {other}"),
        }
    }

    fn sealed_with(cert: &str, plaintext: &str, label: &str) -> Scalar {
        let public_key = parse_first_certificate(cert.as_bytes()).unwrap().public_key;
        let ciphertext = hybrid_encrypt(&public_key, plaintext.as_bytes(), label).unwrap();
        let value = format!("{SEALED_PREFIX}{}", STANDARD.encode(ciphertext));
        Scalar::new(value.clone(), ScalarStyle::Plain, 0..value.len(), false)
    }

    fn decrypt(value: &str, key: &str, label: &str) -> std::result::Result<String, String> {
        let keys = BTreeMap::from([("k".to_string(), parse_private_key(key).unwrap())]);
        let ciphertext = STANDARD
            .decode(value.strip_prefix(SEALED_PREFIX).unwrap())
            .unwrap();
        hybrid_decrypt(&keys, &ciphertext, label)
            .map(|plain| String::from_utf8(plain.to_vec()).unwrap())
            .map_err(|e| e.to_string())
    }

    #[test]
    fn test_reseal_rotates_key_and_migrates_scope() {
        let rule = cluster_rule("b", "default");
        let provider =
            FakeProvider::default().with_key_set(&cluster(&rule), vec![KEY_A, KEY_B], CERT_B);
        let mut metadata = Metadata {
            name: "a".to_string(),
            namespace: "default".to_string(),
            sealed_at: "2020-05-03T23:37:44Z".to_string(),
            cert: CERT_A.to_string(),
        };

        let mut value = sealed_with(CERT_A, "secret!", "default/a");
        let mut resealer = Resealer::new(&rule, &mut metadata, &provider).unwrap();
        resealer.reseal("password", &mut value).unwrap();
        assert_eq!(resealer.resealed_count(), 1);

        assert_eq!(decrypt(value.value(), KEY_B, "default/b").unwrap(), "secret!");
        assert!(decrypt(value.value(), KEY_B, "default/a").is_err());
        assert!(decrypt(value.value(), KEY_A, "default/b").is_err());

        assert_eq!(metadata.name, "b");
        assert_eq!(metadata.cert, CERT_B);
        assert_ne!(metadata.sealed_at, "2020-05-03T23:37:44Z");
    }

    #[test]
    fn test_reseal_seals_plaintext_and_skips_other_keys() {
        let rule = cluster_rule("secret", "default");
        let provider =
            FakeProvider::default().with_key_set(&cluster(&rule), vec![KEY_A], CERT_A);
        let mut metadata = Metadata::default();
        let mut resealer = Resealer::new(&rule, &mut metadata, &provider).unwrap();

        let mut plain = Scalar::new("1234".to_string(), ScalarStyle::Plain, 0..4, false);
        resealer.reseal("pin", &mut plain).unwrap();
        assert_eq!(decrypt(plain.value(), KEY_A, "default/secret").unwrap(), "1234");

        let mut other = Scalar::new("john".to_string(), ScalarStyle::Plain, 0..4, false);
        resealer.reseal("username", &mut other).unwrap();
        assert_eq!(other.value(), "john");
        assert!(!other.is_modified());
    }

    #[test]
    fn test_reseal_requires_cluster_source() {
        let mut rule = cluster_rule("secret", "default");
        rule.source = CertSource::Url("https://example.org/v1/cert.pem".to_string());
        let mut metadata = Metadata::default();

        let result = Resealer::new(&rule, &mut metadata, &FakeProvider::default());
        assert!(matches!(
            result,
            Err(SealError::UnsupportedSource { rule: 0, kind: "url" })
        ));
    }

    #[test]
    fn test_reseal_decrypt_failures() {
        let rule = cluster_rule("secret", "default");
        let provider =
            FakeProvider::default().with_key_set(&cluster(&rule), vec![KEY_A], CERT_A);

        let test_cases = vec![
            // sealed for a key the cluster does not hold
            sealed_with(CERT_B, "secret!", "default/secret"),
            // sealed under another scope
            sealed_with(CERT_A, "secret!", "default/other"),
            Scalar::new("ENC:%%%".to_string(), ScalarStyle::Plain, 0..7, false),
        ];

        for mut value in test_cases {
            let mut metadata = Metadata {
                name: "secret".to_string(),
                namespace: "default".to_string(),
                sealed_at: String::new(),
                cert: CERT_A.to_string(),
            };
            let original = value.value().to_string();
            let mut resealer = Resealer::new(&rule, &mut metadata, &provider).unwrap();
            let result = resealer.reseal("password", &mut value);

            assert!(
                matches!(&result, Err(SealError::DecryptFailed { key, .. }) if key == "password"),
                "{original} should fail to decrypt"
            );
            assert_eq!(value.value(), original);
        }
    }
}
