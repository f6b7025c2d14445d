//! # Run Settings
//!
//! Process-level settings loaded from environment variables.
//!
//! All settings have defaults; CLI flags override whatever the environment
//! provides. The kubeconfig path is passed explicitly to the certificate
//! fetcher rather than kept in process-wide state.

use std::path::PathBuf;

use crate::constants::{DEFAULT_CONFIG_FILE, DEFAULT_LOG_LEVEL};

/// Settings for one sealit invocation
#[derive(Debug, Clone)]
pub struct Settings {
    /// Configuration file, relative paths resolve against `workdir`
    pub config_path: PathBuf,
    /// Kubeconfig file; `None` uses kube's default discovery (`KUBECONFIG`, `~/.kube/config`)
    pub kubeconfig: Option<PathBuf>,
    /// Directory whose files are sealed
    pub workdir: PathBuf,
    /// Log level for the `sealit` target (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            kubeconfig: None,
            workdir: PathBuf::from("."),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            config_path: PathBuf::from(env_var_or_default_str("SEALIT_CONFIG", DEFAULT_CONFIG_FILE)),
            kubeconfig: env_var_non_empty("SEALIT_KUBECONFIG").map(PathBuf::from),
            workdir: PathBuf::from(env_var_or_default_str("SEALIT_WORKDIR", ".")),
            log_level: env_var_or_default_str("SEALIT_LOG_LEVEL", DEFAULT_LOG_LEVEL),
        }
    }

    /// Configuration file location, resolved against the working directory
    pub fn config_file(&self) -> PathBuf {
        if self.config_path.is_absolute() {
            self.config_path.clone()
        } else {
            self.workdir.join(&self.config_path)
        }
    }
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    env_var_non_empty(key).unwrap_or_else(|| default.to_string())
}

/// Read environment variable, treating empty values as unset
fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_resolves_against_workdir() {
        let settings = Settings {
            workdir: PathBuf::from("/srv/values"),
            ..Settings::default()
        };
        assert_eq!(
            settings.config_file(),
            PathBuf::from("/srv/values/.sealit.yaml")
        );

        let settings = Settings {
            config_path: PathBuf::from("/etc/sealit.yaml"),
            ..settings
        };
        assert_eq!(settings.config_file(), PathBuf::from("/etc/sealit.yaml"));
    }
}
