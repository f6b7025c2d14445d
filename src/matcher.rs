//! # Rule Matcher
//!
//! Binds the files of a working directory to the sealing rules whose
//! `fileRegex` matches their name.
//!
//! Only regular files directly inside the directory are considered
//! (symlinks are followed), in file name order. The configuration file is
//! never a values file.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::config::SealingRuleSet;
use crate::error::{Result, SealError};

/// A file and the indices of the rules that apply to it, in declared order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatch {
    pub path: PathBuf,
    pub file_name: String,
    pub rules: Vec<usize>,
}

/// Matches directory entries against rule file patterns
#[derive(Debug)]
pub struct RuleMatcher<'c> {
    rules: &'c [SealingRuleSet],
    excluded: Option<PathBuf>,
}

impl<'c> RuleMatcher<'c> {
    /// `excluded` is skipped even if a pattern matches it
    pub fn new(rules: &'c [SealingRuleSet], excluded: Option<&Path>) -> Self {
        Self {
            rules,
            excluded: excluded.map(canonical),
        }
    }

    /// Enumerate `root` and bind each file to its rules.
    ///
    /// Fails with [`SealError::ConfigInvalid`] when one file is matched by
    /// rules with different scopes, since a document holds a single
    /// metadata block.
    pub fn matches(&self, root: &Path) -> Result<Vec<FileMatch>> {
        let mut matches = Vec::new();

        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str() else {
                debug!("Skipping file with non UTF-8 name {}", entry.path().display());
                continue;
            };
            if self.is_excluded(entry.path()) {
                debug!("Skipping configuration file {}", entry.path().display());
                continue;
            }

            let rules: Vec<usize> = self
                .rules
                .iter()
                .enumerate()
                .filter(|(_, rule)| rule.matches_file(file_name))
                .map(|(position, _)| position)
                .collect();
            if rules.is_empty() {
                continue;
            }

            self.check_scopes(file_name, &rules)?;
            debug!("File {} matches sealing rule(s) {:?}", file_name, rules);
            matches.push(FileMatch {
                path: entry.path().to_path_buf(),
                file_name: file_name.to_string(),
                rules,
            });
        }

        Ok(matches)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded
            .as_ref()
            .is_some_and(|excluded| canonical(path) == *excluded)
    }

    fn check_scopes(&self, file_name: &str, rules: &[usize]) -> Result<()> {
        let first = &self.rules[rules[0]];
        if let Some(other) = rules[1..]
            .iter()
            .map(|&position| &self.rules[position])
            .find(|rule| rule.scope != first.scope)
        {
            return Err(SealError::ConfigInvalid(format!(
                "file {file_name} is matched by sealing rules {} ({}) and {} ({}) with different scopes",
                first.index, first.scope, other.index, other.scope
            )));
        }
        Ok(())
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::config::SealitConfig;

    fn config(rules: &[(&str, &str)]) -> SealitConfig {
        let mut yaml = String::from("sealingRules:\n");
        for (file_regex, name) in rules {
            yaml.push_str(&format!(
                "  - fileRegex: '{file_regex}'\n    name: {name}\n    namespace: default\n    secretsRegex: password\n    cert: {{sources: {{path: cert.pem}}}}\n"
            ));
        }
        SealitConfig::from_yaml(&yaml).unwrap()
    }

    fn workdir(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            fs::write(dir.path().join(file), "a: 1\n").unwrap();
        }
        fs::create_dir(dir.path().join("nested.dev.yaml")).unwrap();
        dir
    }

    #[test]
    fn test_matches_sorted_regular_files() {
        let dir = workdir(&["b.dev.yaml", "a.dev.yaml", "c.prod.yaml", "README.md"]);
        let config = config(&[(r"\.dev\.yaml$", "dev"), (r"\.prod\.yaml$", "prod")]);

        let matches = RuleMatcher::new(&config.rules, None)
            .matches(dir.path())
            .unwrap();

        let found: Vec<_> = matches
            .iter()
            .map(|m| (m.file_name.as_str(), m.rules.clone()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("a.dev.yaml", vec![0]),
                ("b.dev.yaml", vec![0]),
                ("c.prod.yaml", vec![1]),
            ]
        );
    }

    #[test]
    fn test_config_file_is_excluded() {
        let dir = workdir(&[".sealit.yaml", "values.yaml"]);
        let config = config(&[(r"yaml$", "secret")]);
        let config_path = dir.path().join(".sealit.yaml");

        let matches = RuleMatcher::new(&config.rules, Some(&config_path))
            .matches(dir.path())
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].file_name, "values.yaml");
    }

    #[test]
    fn test_rules_with_same_scope_apply_in_order() {
        let dir = workdir(&["values.dev.yaml"]);
        let config = config(&[(r"dev", "secret"), (r"yaml$", "secret")]);

        let matches = RuleMatcher::new(&config.rules, None)
            .matches(dir.path())
            .unwrap();
        assert_eq!(matches[0].rules, vec![0, 1]);
    }

    #[test]
    fn test_rules_with_different_scopes_are_ambiguous() {
        let dir = workdir(&["values.dev.yaml"]);
        let config = config(&[(r"dev", "one"), (r"yaml$", "two")]);

        let result = RuleMatcher::new(&config.rules, None).matches(dir.path());
        assert!(
            matches!(&result, Err(SealError::ConfigInvalid(msg)) if msg.contains("values.dev.yaml"))
        );
    }

    #[test]
    fn test_missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let config = config(&[(r"yaml$", "secret")]);

        let result = RuleMatcher::new(&config.rules, None).matches(&dir.path().join("missing"));
        assert!(matches!(result, Err(SealError::Io(_))));
    }
}
