//! # Logging
//!
//! Tracing subscriber setup for the binary.
//!
//! `RUST_LOG` takes precedence. Without it only the `sealit` target logs,
//! at the requested level. Output goes to stderr so that commands writing
//! to stdout (`template`) stay pipeable.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(level: &str) -> String {
    format!("sealit={}", level.trim().to_lowercase())
}

/// Install the global subscriber; later calls are ignored
pub fn init(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level).into());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
