//! # Template Command
//!
//! Prints or writes the Helm `SealedSecret` template.

use std::path::Path;

use anyhow::{Context, Result};
use sealit::scaffold;

pub fn template_command(file: Option<&Path>) -> Result<()> {
    scaffold::write_template(file).context("Failed to write SealedSecret template")?;
    if let Some(path) = file {
        println!("Created {}", path.display());
    }
    Ok(())
}
