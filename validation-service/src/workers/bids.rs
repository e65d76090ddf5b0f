use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::executor::CommandExecutor;
use super::validator::{ValidatorAdapter, ValidatorOutcome};
use crate::models::{Badge, Diagnostic, ValidatorKind};

/// Repository-local options read from the validation config file.
#[derive(Debug, Default, Deserialize)]
struct RepoValidationConfig {
    #[serde(default)]
    bidsconfig: BidsConfig,
}

#[derive(Debug, Default, Deserialize)]
struct BidsConfig {
    #[serde(default)]
    bidsroot: Option<String>,
    #[serde(default)]
    validatenifti: bool,
}

#[derive(Debug, Deserialize)]
struct BidsReport {
    issues: BidsIssues,
}

#[derive(Debug, Deserialize)]
struct BidsIssues {
    #[serde(default)]
    errors: Vec<BidsIssue>,
    #[serde(default)]
    warnings: Vec<BidsIssue>,
}

#[derive(Debug, Deserialize)]
struct BidsIssue {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    files: Vec<serde_json::Value>,
}

impl BidsIssue {
    fn message(&self) -> String {
        match (&self.key, &self.reason) {
            (Some(key), Some(reason)) => format!("{}: {}", key, reason),
            (Some(text), None) | (None, Some(text)) => text.clone(),
            (None, None) => "Unspecified issue".to_string(),
        }
    }

    fn diagnostic(&self, error: bool) -> Diagnostic {
        let diagnostic = if error {
            Diagnostic::error(self.message())
        } else {
            Diagnostic::warning(self.message())
        };
        match self.files.len() {
            0 => diagnostic,
            n => diagnostic.at(format!("{} file(s)", n)),
        }
    }
}

/// Drives `bids-validator --json` and classifies from its issue counts.
pub struct BidsValidator {
    executable: String,
    config_file: String,
}

impl BidsValidator {
    pub fn new(executable: impl Into<String>, config_file: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            config_file: config_file.into(),
        }
    }

    async fn read_config(&self, root: &Path) -> BidsConfig {
        let path = root.join(&self.config_file);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(_) => return BidsConfig::default(),
        };
        match serde_yaml_ng::from_slice::<RepoValidationConfig>(&data) {
            Ok(config) => config.bidsconfig,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid validation config");
                BidsConfig::default()
            }
        }
    }

    /// `bidsroot` if it names an existing directory inside `root`.
    fn resolve_root(root: &Path, bidsroot: Option<&str>) -> PathBuf {
        let Some(sub) = bidsroot.map(str::trim).filter(|s| !s.is_empty()) else {
            return root.to_path_buf();
        };
        let relative = Path::new(sub);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        let candidate = root.join(relative);
        if contained && candidate.is_dir() {
            candidate
        } else {
            tracing::warn!(bidsroot = %sub, "Configured BIDS root is not a directory in the repository");
            root.to_path_buf()
        }
    }

    fn args(config: &BidsConfig, root: &Path) -> Vec<String> {
        let mut args = Vec::new();
        if !config.validatenifti {
            args.push("--ignoreNiftiHeaders".to_string());
        }
        args.push("--json".to_string());
        args.push(root.to_string_lossy().into_owned());
        args
    }

    fn parse_report(stdout: &[u8]) -> Option<Vec<Diagnostic>> {
        let report: BidsReport = serde_json::from_slice(stdout).ok()?;
        let mut diagnostics: Vec<Diagnostic> =
            report.issues.errors.iter().map(|i| i.diagnostic(true)).collect();
        diagnostics.extend(report.issues.warnings.iter().map(|i| i.diagnostic(false)));
        Some(diagnostics)
    }
}

#[async_trait]
impl ValidatorAdapter for BidsValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Bids
    }

    fn executable(&self) -> &str {
        &self.executable
    }

    async fn run(
        &self,
        root: &Path,
        executor: &CommandExecutor,
        cancel: &CancellationToken,
    ) -> ValidatorOutcome {
        let config = self.read_config(root).await;
        let validation_root = Self::resolve_root(root, config.bidsroot.as_deref());
        let args = Self::args(&config, &validation_root);

        let output = match executor
            .execute(&self.executable, &args, Some(root), &[], cancel)
            .await
        {
            Ok(output) => output,
            Err(e) => return ValidatorOutcome::from_exec_error(&e),
        };

        let Some(diagnostics) = Self::parse_report(&output.stdout) else {
            let mut outcome = ValidatorOutcome::failure("Unable to parse BIDS validator report");
            outcome.report = if output.stdout.is_empty() {
                output.stderr
            } else {
                output.stdout
            };
            return outcome;
        };

        let mut outcome = ValidatorOutcome::from_diagnostics(diagnostics, output.stdout);
        if !output.status.success() {
            outcome.badge = Badge::Failure;
            outcome.diagnostics.push(Diagnostic::error(format!(
                "{} exited with {}",
                self.executable, output.status
            )));
        }
        outcome
    }
}
