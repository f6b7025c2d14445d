//! # Constants
//!
//! Shared constants used throughout sealit.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Reserved top-level key holding the per-document metadata block
pub const METADATA_KEY: &str = "sealit";

/// Prefix marking a value as sealed
pub const SEALED_PREFIX: &str = "ENC:";

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = ".sealit.yaml";

/// Default maximum certificate age before a fresh certificate is fetched
/// 30 days, matching the sealed-secrets controller key renewal period
pub const DEFAULT_MAX_CERT_AGE: &str = "720h";

/// Label selecting the sealed-secrets controller key pairs
pub const SEALED_SECRETS_KEY_LABEL: &str = "sealedsecrets.bitnami.com/sealed-secrets-key";

/// Path served by the sealed-secrets controller for its active certificate
pub const CONTROLLER_CERT_PATH: &str = "/v1/cert.pem";

/// Secret data key holding the PEM certificate of a controller key pair
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Secret data key holding the PEM private key of a controller key pair
pub const TLS_PRIVATE_KEY: &str = "tls.key";

/// Size of the AES-256-GCM session key wrapped by RSA-OAEP
pub const SESSION_KEY_BYTES: usize = 32;

/// Annotation marking a `SealedSecret` as decryptable under any name and namespace
pub const CLUSTER_WIDE_ANNOTATION: &str = "sealedsecrets.bitnami.com/cluster-wide";

/// Annotation marking a `SealedSecret` as decryptable under any name within its namespace
pub const NAMESPACE_WIDE_ANNOTATION: &str = "sealedsecrets.bitnami.com/namespace-wide";

/// Indentation used for generated metadata blocks when a document has no nested mapping
pub const DEFAULT_INDENT: usize = 2;

/// Default log level when neither `RUST_LOG` nor `SEALIT_LOG_LEVEL` is set
pub const DEFAULT_LOG_LEVEL: &str = "warn";
