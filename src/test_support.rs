//! Fixtures and fakes shared by the unit tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use crate::cert::{CertificateProvider, KeySet};
use crate::config::{CertSource, ClusterSource};
use crate::crypto::{parse_first_certificate, parse_private_key, public_key_fingerprint};
use crate::error::{Result, SealError};

pub const CERT_A: &str = include_str!("../tests/fixtures/cert-a.pem");
pub const CERT_B: &str = include_str!("../tests/fixtures/cert-b.pem");
pub const CERT_EXPIRED: &str = include_str!("../tests/fixtures/cert-expired.pem");
pub const KEY_A: &str = include_str!("../tests/fixtures/key-a.pem");
pub const KEY_B: &str = include_str!("../tests/fixtures/key-b.pem");

/// In-memory provider keyed by the source's display name.
#[derive(Debug, Default)]
pub struct FakeProvider {
    pub certificates: HashMap<String, String>,
    /// Private keys (PEM) plus the active certificate, per cluster service.
    pub key_sets: HashMap<String, (Vec<&'static str>, &'static str)>,
    pub fetches: RefCell<Vec<String>>,
}

impl FakeProvider {
    pub fn with_certificate(source: &CertSource, pem: &str) -> Self {
        let mut provider = Self::default();
        provider.certificates.insert(source.to_string(), pem.to_string());
        provider
    }

    pub fn with_key_set(
        mut self,
        source: &ClusterSource,
        private_keys: Vec<&'static str>,
        certificate: &'static str,
    ) -> Self {
        self.key_sets
            .insert(source.to_string(), (private_keys, certificate));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.borrow().len()
    }
}

impl CertificateProvider for FakeProvider {
    fn fetch_certificate(&self, source: &CertSource) -> Result<Vec<u8>> {
        let name = source.to_string();
        self.fetches.borrow_mut().push(name.clone());
        self.certificates
            .get(&name)
            .map(|pem| pem.as_bytes().to_vec())
            .ok_or(SealError::NotFound(name))
    }

    fn fetch_key_set(&self, source: &ClusterSource) -> Result<KeySet> {
        let name = source.to_string();
        self.fetches.borrow_mut().push(name.clone());
        let (pems, certificate) = self
            .key_sets
            .get(&name)
            .ok_or_else(|| SealError::NotFound(name.clone()))?;

        let mut private_keys = BTreeMap::new();
        for pem in pems {
            let key = parse_private_key(pem)?;
            private_keys.insert(public_key_fingerprint(&key.to_public_key())?, key);
        }
        let public_key = parse_first_certificate(certificate.as_bytes())
            .map_err(SealError::CertificateUnreadable)?
            .public_key;

        Ok(KeySet {
            private_keys,
            public_key,
            certificate: (*certificate).to_string(),
        })
    }
}
