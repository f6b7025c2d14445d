//! # Configuration
//!
//! Loading of `.sealit.yaml` and process settings.
//!
//! ## Features
//!
//! - **File model**: [`spec`] mirrors the YAML layout
//! - **Validation**: [`validation`] compiles rules, fails before any file is touched
//! - **Durations**: Go-style `maxAge` strings
//! - **Settings**: environment defaults with CLI overrides

pub mod duration;
pub mod settings;
pub mod spec;
pub mod validation;

use std::path::Path;

use tracing::debug;

pub use settings::Settings;
pub use spec::{CertSpec, ConfigSpec, KubernetesSourceSpec, RuleSpec, SourcesSpec};
pub use validation::{CertSource, ClusterSource, SealingRuleSet};

use crate::error::{Result, SealError};

/// Validated configuration: the sealing rules in declared order
#[derive(Debug, Clone)]
pub struct SealitConfig {
    pub rules: Vec<SealingRuleSet>,
}

impl SealitConfig {
    /// Read and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Load config file {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            SealError::ConfigInvalid(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
            .map_err(|e| match e {
                SealError::ConfigInvalid(msg) => {
                    SealError::ConfigInvalid(format!("{}: {msg}", path.display()))
                }
                other => other,
            })
    }

    /// Parse and validate configuration text
    pub fn from_yaml(text: &str) -> Result<Self> {
        let spec: ConfigSpec = if text.trim().is_empty() {
            ConfigSpec::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| SealError::ConfigInvalid(e.to_string()))?
        };

        let rules = spec
            .sealing_rules
            .iter()
            .enumerate()
            .map(|(index, rule)| rule.validate(index))
            .collect::<Result<Vec<_>>>()?;

        debug!("Loaded {} sealing rule(s)", rules.len());
        Ok(Self { rules })
    }
}
