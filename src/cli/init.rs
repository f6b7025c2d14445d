//! # Init Command
//!
//! Writes an example configuration file.

use anyhow::{Context, Result};
use sealit::{scaffold, Settings};

/// Write the example configuration to the configured location
pub fn init_command(settings: &Settings, force: bool) -> Result<()> {
    let path = settings.config_file();
    scaffold::write_example_config(&path, force)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    println!("Created {}", path.display());
    println!("Edit the sealing rules, then run `sealit seal`.");
    Ok(())
}
