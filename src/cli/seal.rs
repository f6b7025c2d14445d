//! # Seal Commands
//!
//! `seal` encrypts plaintext values, `reseal` re-encrypts sealed ones with
//! the newest cluster key.

use anyhow::{Context, Result};
use sealit::{CertRefresh, Engine, Settings};

use super::{load, print_report};

/// Seal every matching plaintext value
pub fn seal_command(settings: &Settings, refresh: CertRefresh) -> Result<()> {
    let (config_file, config, fetcher) = load(settings)?;

    let report = Engine::new(&config, &settings.workdir, &fetcher)
        .with_config_path(config_file)
        .seal(refresh)
        .context("Sealing failed")?;

    print_report(&report, &settings.workdir);
    println!(
        "\nSealed {} value(s), {} file(s) updated.",
        report.values(),
        report.written()
    );
    Ok(())
}

/// Re-encrypt every matching value under the newest cluster key
pub fn reseal_command(settings: &Settings) -> Result<()> {
    let (config_file, config, fetcher) = load(settings)?;

    let report = Engine::new(&config, &settings.workdir, &fetcher)
        .with_config_path(config_file)
        .reseal()
        .context("Resealing failed")?;

    print_report(&report, &settings.workdir);
    println!(
        "\nResealed {} value(s), {} file(s) updated.",
        report.values(),
        report.written()
    );
    Ok(())
}
