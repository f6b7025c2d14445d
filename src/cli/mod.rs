//! # sealit CLI
//!
//! Command-line interface for sealing the secret values of YAML files.
//!
//! ## Usage
//!
//! ```bash
//! # Write an example .sealit.yaml
//! sealit init
//!
//! # Seal every matching plaintext value
//! sealit seal
//!
//! # Seal, fetching a fresh certificate first
//! sealit seal --fetch-cert
//!
//! # Fail (exit code 1) when a matching value is still plaintext
//! sealit verify
//!
//! # Re-encrypt everything with the newest cluster key
//! sealit reseal
//!
//! # Print a Helm SealedSecret template
//! sealit template
//! ```
//!
//! ## Exit codes
//!
//! - `0`: success
//! - `1`: `verify` found a plaintext value
//! - `2`: any other error

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sealit::{CertRefresh, RunReport, SealError, SealitConfig, Settings, SourceFetcher};

mod init;
mod seal;
mod template;
mod verify;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_HASH"),
    ", built ",
    env!("BUILD_DATETIME"),
    ")"
);

/// Seal the secret values of YAML files with sealed-secrets certificates
#[derive(Parser)]
#[command(name = "sealit", version = VERSION)]
#[command(
    about = "Seal the secret values of YAML files with sealed-secrets certificates",
    long_about = None,
    after_help = "\
Examples:
  sealit init
  sealit seal --fetch-cert
  sealit verify
  sealit template --file templates/sealed-secret.yaml
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: .sealit.yaml, or SEALIT_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Kubeconfig used by kubernetes certificate sources
    #[arg(long, global = true, value_name = "FILE")]
    kubeconfig: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example configuration file
    #[command(visible_alias = "i")]
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Seal the plaintext values of every matching file
    #[command(visible_alias = "s")]
    Seal {
        /// Keep using a stored certificate that is past its maxAge
        #[arg(long)]
        force: bool,

        /// Fetch a fresh certificate even if the stored one is valid
        #[arg(long)]
        fetch_cert: bool,
    },
    /// Re-encrypt every sealed value with the newest cluster key
    /// Requires a kubernetes certificate source
    #[command(visible_alias = "r")]
    Reseal,
    /// Check that no matching value is left in plaintext
    #[command(visible_alias = "v")]
    Verify {
        /// Fetch a fresh certificate even if the stored one is valid
        #[arg(long)]
        fetch_cert: bool,
    },
    /// Print a Helm SealedSecret template driven by the sealit metadata
    #[command(visible_alias = "t")]
    Template {
        /// Write the template to FILE instead of stdout
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(config) = cli.config {
        settings.config_path = config;
    }
    if let Some(kubeconfig) = cli.kubeconfig {
        settings.kubeconfig = Some(kubeconfig);
    }
    if cli.debug {
        settings.log_level = "debug".to_string();
    }

    sealit::logging::init(&settings.log_level);

    // kube's TLS stack needs a process-wide provider before the first client is built
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    match run(cli.command, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err),
    }
}

fn run(command: Commands, settings: &Settings) -> Result<()> {
    match command {
        Commands::Init { force } => init::init_command(settings, force),
        Commands::Seal { force, fetch_cert } => {
            let refresh = if fetch_cert {
                CertRefresh::Always
            } else if force {
                CertRefresh::KeepDeprecated
            } else {
                CertRefresh::WhenStale
            };
            seal::seal_command(settings, refresh)
        }
        Commands::Reseal => seal::reseal_command(settings),
        Commands::Verify { fetch_cert } => {
            let refresh = if fetch_cert {
                CertRefresh::Always
            } else {
                CertRefresh::WhenStale
            };
            verify::verify_command(settings, refresh)
        }
        Commands::Template { file } => template::template_command(file.as_deref()),
    }
}

/// Print the error and map it to the process exit code
fn report_error(err: &anyhow::Error) -> ExitCode {
    let unsealed = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<SealError>())
        .is_some_and(SealError::is_unsealed);

    if unsealed {
        eprintln!("✗ {err:#}");
        ExitCode::from(1)
    } else {
        eprintln!("Error: {err:#}");
        ExitCode::from(2)
    }
}

/// Load the configuration and build the certificate fetcher for a run
fn load(settings: &Settings) -> Result<(PathBuf, SealitConfig, SourceFetcher)> {
    let config_file = settings.config_file();
    let config = SealitConfig::load(&config_file).context("Failed to load sealit configuration")?;
    let fetcher = SourceFetcher::new(settings.kubeconfig.clone(), &settings.workdir)
        .context("Failed to set up certificate fetching")?;
    Ok((config_file, config, fetcher))
}

/// Print one line per processed file
fn print_report(report: &RunReport, root: &Path) {
    if report.files.is_empty() {
        println!("No file matches the sealing rules.");
        return;
    }

    println!("{:<40} {:<10} {:<8} {:<8}", "FILE", "RULES", "VALUES", "WRITTEN");
    println!("{}", "-".repeat(69));

    for file in &report.files {
        let name = file.path.strip_prefix(root).unwrap_or(&file.path).display();
        let rules = file
            .rules
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let written = if file.written { "Yes" } else { "No" };
        println!(
            "{:<40} {:<10} {:<8} {:<8}",
            name.to_string(),
            rules,
            file.values,
            written
        );
    }
}
