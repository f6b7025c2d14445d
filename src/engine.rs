//! # Engine
//!
//! Orchestrates a run over the working directory:
//!
//! 1. Enumerate files and bind them to sealing rules ([`RuleMatcher`])
//! 2. Load each file into a [`ValuesFile`]
//! 3. Apply a [`Sealer`] or [`Resealer`] per matching rule, in declared order
//! 4. Write the document back when its serialized form changed
//!
//! Files are processed one at a time. The first error aborts the run and
//! is reported with the file it occurred in; files already written stay
//! written, the failing file is left untouched.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::cert::CertificateProvider;
use crate::config::SealitConfig;
use crate::error::Result;
use crate::matcher::{FileMatch, RuleMatcher};
use crate::sealer::{CertRefresh, Resealer, Sealer};
use crate::values::ValuesFile;

/// What a run does to every matching value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Seal(CertRefresh),
    Verify(CertRefresh),
    Reseal,
}

/// Outcome for one processed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    /// Indices of the rules applied, in order
    pub rules: Vec<usize>,
    /// Values sealed or resealed
    pub values: usize,
    /// Whether the file was rewritten
    pub written: bool,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub files: Vec<FileReport>,
}

impl RunReport {
    /// Total number of values sealed or resealed
    pub fn values(&self) -> usize {
        self.files.iter().map(|file| file.values).sum()
    }

    /// Number of files rewritten
    pub fn written(&self) -> usize {
        self.files.iter().filter(|file| file.written).count()
    }
}

/// Runs seal, verify and reseal over one working directory
pub struct Engine<'a> {
    config: &'a SealitConfig,
    root: PathBuf,
    config_path: Option<PathBuf>,
    provider: &'a dyn CertificateProvider,
}

impl<'a> Engine<'a> {
    pub fn new(
        config: &'a SealitConfig,
        root: impl Into<PathBuf>,
        provider: &'a dyn CertificateProvider,
    ) -> Self {
        Self {
            config,
            root: root.into(),
            config_path: None,
            provider,
        }
    }

    /// Never treat the configuration file at `path` as a values file
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Seal every plaintext value matching its rule's `secretsRegex`
    pub fn seal(&self, refresh: CertRefresh) -> Result<RunReport> {
        self.run(Operation::Seal(refresh))
    }

    /// Fail with [`crate::SealError::UnsealedSecret`] on the first plaintext
    /// value that should be sealed. Never writes.
    pub fn verify(&self, refresh: CertRefresh) -> Result<RunReport> {
        self.run(Operation::Verify(refresh))
    }

    /// Re-encrypt every matching value under the newest cluster key
    pub fn reseal(&self) -> Result<RunReport> {
        self.run(Operation::Reseal)
    }

    fn run(&self, operation: Operation) -> Result<RunReport> {
        let matches = RuleMatcher::new(&self.config.rules, self.config_path.as_deref())
            .matches(&self.root)?;
        debug!("{} file(s) match the sealing rules", matches.len());

        let mut report = RunReport::default();
        for file in &matches {
            let file_report = self
                .process(file, operation)
                .map_err(|e| e.in_file(&file.path))?;
            report.files.push(file_report);
        }
        Ok(report)
    }

    fn process(&self, file: &FileMatch, operation: Operation) -> Result<FileReport> {
        debug!("Load values file {}", file.path.display());
        let original = String::from_utf8(fs::read(&file.path)?)?;
        let mut values_file = ValuesFile::parse(&original)?;
        let ValuesFile { tree, metadata, .. } = &mut values_file;

        let mut values = 0;
        for &index in &file.rules {
            let rule = &self.config.rules[index];
            match operation {
                Operation::Seal(refresh) => {
                    let mut sealer = Sealer::new(rule, metadata, self.provider, refresh)?;
                    tree.visit_values(|key, value| sealer.seal(key, value))?;
                    values += sealer.sealed_count();
                }
                Operation::Verify(refresh) => {
                    let sealer = Sealer::new(rule, metadata, self.provider, refresh)?;
                    tree.visit_values(|key, value| sealer.verify(key, value))?;
                }
                Operation::Reseal => {
                    let mut resealer = Resealer::new(rule, metadata, self.provider)?;
                    tree.visit_values(|key, value| resealer.reseal(key, value))?;
                    values += resealer.resealed_count();
                }
            }
        }

        let mut written = false;
        if !matches!(operation, Operation::Verify(_)) {
            let exported = values_file.export();
            if exported != original {
                write_atomic(&file.path, &exported)?;
                written = true;
            }
        }

        match operation {
            Operation::Verify(_) => info!("✅ All secrets in {} are sealed", file.file_name),
            _ if written => info!("✅ Sealed {} value(s) in {}", values, file.file_name),
            _ => info!("{} is unchanged", file.file_name),
        }

        Ok(FileReport {
            path: file.path.clone(),
            rules: file.rules.clone(),
            values,
            written,
        })
    }
}

/// Replace `path` with `contents` in one rename, keeping its permissions
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let permissions = fs::metadata(path)?.permissions();

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.as_file().sync_all()?;
    fs::set_permissions(temp.path(), permissions)?;
    temp.persist(path).map_err(|e| e.error)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::{CertSource, SealitConfig};
    use crate::error::SealError;
    use crate::test_support::{FakeProvider, CERT_A, CERT_B, KEY_A, KEY_B};

    const CLUSTER_CONFIG: &str = r"
sealingRules:
  - fileRegex: \.dev\.yaml$
    name: secret
    namespace: default
    secretsRegex: (password|pin)$
    cert:
      sources:
        kubernetes:
          name: sealed-secrets
          namespace: kube-system
";

    fn cluster_provider(config: &SealitConfig, certificate: &'static str) -> FakeProvider {
        let source = &config.rules[0].source;
        let CertSource::Cluster(cluster) = source else {
            panic!("expected a cluster source");
        };
        FakeProvider::with_certificate(source, certificate).with_key_set(
            cluster,
            vec![KEY_A, KEY_B],
            CERT_B,
        )
    }

    fn workdir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, contents) in files {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        dir
    }

    fn read(dir: &TempDir, name: &str) -> String {
        fs::read_to_string(dir.path().join(name)).unwrap()
    }

    #[test]
    fn test_seal_then_reseal() {
        let config = SealitConfig::from_yaml(CLUSTER_CONFIG).unwrap();
        let provider = cluster_provider(&config, CERT_A);
        let dir = workdir(&[("app.dev.yaml", "env:\n  username: john\n  password: secret\n")]);
        let engine = Engine::new(&config, dir.path(), &provider);

        let report = engine.seal(CertRefresh::WhenStale).unwrap();
        assert_eq!(report.values(), 1);
        assert_eq!(report.written(), 1);
        let sealed = ValuesFile::parse(&read(&dir, "app.dev.yaml")).unwrap();
        assert_eq!(sealed.metadata.cert, CERT_A);

        let report = engine.reseal().unwrap();
        assert_eq!(report.values(), 1);
        let resealed = ValuesFile::parse(&read(&dir, "app.dev.yaml")).unwrap();
        assert_eq!(resealed.metadata.cert, CERT_B);
        assert!(read(&dir, "app.dev.yaml").contains("username: john\n"));

        engine.verify(CertRefresh::WhenStale).unwrap();
    }

    #[test]
    fn test_verify_reports_file_and_key() {
        let config = SealitConfig::from_yaml(CLUSTER_CONFIG).unwrap();
        let provider = cluster_provider(&config, CERT_A);
        let original = "pin: 1234\n";
        let dir = workdir(&[("app.dev.yaml", original)]);

        let err = Engine::new(&config, dir.path(), &provider)
            .verify(CertRefresh::WhenStale)
            .unwrap_err();

        assert!(err.is_unsealed());
        assert!(matches!(&err, SealError::InFile { path, .. } if path.ends_with("app.dev.yaml")));
        assert!(matches!(err.root(), SealError::UnsealedSecret { key } if key == "pin"));
        assert_eq!(read(&dir, "app.dev.yaml"), original);
    }

    #[test]
    fn test_unchanged_file_is_not_rewritten() {
        let config = SealitConfig::from_yaml(CLUSTER_CONFIG).unwrap();
        let provider = cluster_provider(&config, CERT_A);
        let dir = workdir(&[("app.dev.yaml", "password: x\n")]);
        let engine = Engine::new(&config, dir.path(), &provider);

        engine.seal(CertRefresh::WhenStale).unwrap();
        let sealed = read(&dir, "app.dev.yaml");

        let report = engine.seal(CertRefresh::WhenStale).unwrap();
        assert_eq!(report.written(), 0);
        assert_eq!(report.values(), 0);
        assert_eq!(read(&dir, "app.dev.yaml"), sealed);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = workdir(&[("values.yaml", "a: 1\n")]);
        let path = dir.path().join("values.yaml");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        write_atomic(&path, "a: 2\n").unwrap();

        assert_eq!(read(&dir, "values.yaml"), "a: 2\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
