//! # Verify Command
//!
//! CI check: fails when a value that should be sealed is plaintext.

use anyhow::{Context, Result};
use sealit::{CertRefresh, Engine, Settings};

use super::load;

/// Verify that every matching value is sealed
pub fn verify_command(settings: &Settings, refresh: CertRefresh) -> Result<()> {
    let (config_file, config, fetcher) = load(settings)?;

    let report = Engine::new(&config, &settings.workdir, &fetcher)
        .with_config_path(config_file)
        .verify(refresh)
        .context("Verification failed")?;

    println!(
        "✓ All secrets are sealed ({} file(s) checked)",
        report.files.len()
    );
    Ok(())
}
