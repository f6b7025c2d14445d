//! Common test utilities for the integration tests
//!
//! Provides fixture access, a temporary working directory and the rustls
//! crypto provider setup shared by all test binaries.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

use base64::Engine as _;
use sealit::crypto::{hybrid_decrypt, parse_private_key};
use tempfile::TempDir;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

/// Path of a file under `tests/fixtures`
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture(name)).expect("Failed to read fixture")
}

/// Configuration with one rule sealing `*.dev.yaml` for `default/secret`
/// with the certificate stored next to the values files
pub fn path_config(cert_file: &str) -> String {
    format!(
        r"sealingRules:
  - fileRegex: \.dev\.yaml$
    name: secret
    namespace: default
    secretsRegex: (password|pin)$
    cert:
      maxAge: 1000000h
      sources:
        path: {cert_file}
"
    )
}

/// Working directory holding a config, `cert.pem` (certificate A) and `files`
pub fn workspace(config: &str, files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join(".sealit.yaml"), config).expect("Failed to write config");
    fs::copy(fixture("cert-a.pem"), dir.path().join("cert.pem")).expect("Failed to copy cert");
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).expect("Failed to write values file");
    }
    dir
}

pub fn read(dir: &TempDir, name: &str) -> String {
    fs::read_to_string(dir.path().join(name)).expect("Failed to read file")
}

/// Recover the plaintext of an `ENC:` value with the given key fixture
pub fn unseal(sealed: &str, key_fixture: &str, label: &str) -> String {
    let encoded = sealed.strip_prefix("ENC:").expect("value is not sealed");
    let ciphertext = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .expect("sealed value is not base64");
    let key = parse_private_key(&read_fixture(key_fixture)).expect("Failed to parse key");
    let keys = BTreeMap::from([("fixture".to_string(), key)]);
    let plaintext = hybrid_decrypt(&keys, &ciphertext, label).expect("Failed to decrypt");
    String::from_utf8(plaintext.to_vec()).expect("plaintext is not UTF-8")
}
