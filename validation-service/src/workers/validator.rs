use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::config::{Executables, Labels};
use crate::models::{Badge, Diagnostic, Severity, ValidatorKind};
use crate::workers::executor::{CommandExecutor, ExecError};
use crate::workers::{BidsValidator, NixValidator, OdmlValidator};

/// What an adapter hands back to the pipeline.
#[derive(Debug, Clone)]
pub struct ValidatorOutcome {
    pub badge: Badge,
    pub diagnostics: Vec<Diagnostic>,
    /// Raw report persisted as the revision's results file.
    pub report: Vec<u8>,
}

impl ValidatorOutcome {
    /// Classify from diagnostics alone.
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>, report: Vec<u8>) -> Self {
        Self {
            badge: classify(&diagnostics),
            diagnostics,
            report,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            badge: Badge::Failure,
            report: message.clone().into_bytes(),
            diagnostics: vec![Diagnostic::error(message)],
        }
    }

    pub fn from_exec_error(err: &ExecError) -> Self {
        Self::failure(err.to_string())
    }
}

/// Any error makes a failure; otherwise any warning makes a warning.
pub fn classify(diagnostics: &[Diagnostic]) -> Badge {
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        Badge::Failure
    } else if diagnostics.iter().any(|d| d.severity == Severity::Warning) {
        Badge::Warning
    } else {
        Badge::Success
    }
}

#[async_trait]
pub trait ValidatorAdapter: Send + Sync {
    fn kind(&self) -> ValidatorKind;

    /// Executable the adapter shells out to, for startup checks.
    fn executable(&self) -> &str;

    /// Validate the checked-out tree at `root`. Never fails: problems become a failure outcome.
    async fn run(
        &self,
        root: &Path,
        executor: &CommandExecutor,
        cancel: &CancellationToken,
    ) -> ValidatorOutcome;
}

pub struct ValidatorRegistry {
    adapters: Vec<Arc<dyn ValidatorAdapter>>,
}

impl ValidatorRegistry {
    /// Adapters for the given kinds, in order.
    pub fn new(kinds: &[ValidatorKind], executables: &Executables, labels: &Labels) -> Self {
        let adapters = kinds
            .iter()
            .map(|kind| -> Arc<dyn ValidatorAdapter> {
                match kind {
                    ValidatorKind::Bids => Arc::new(BidsValidator::new(
                        executables.bids.clone(),
                        labels.validation_config_file.clone(),
                    )),
                    ValidatorKind::Nix => Arc::new(NixValidator::new(executables.nix.clone())),
                    ValidatorKind::Odml => Arc::new(OdmlValidator::new(executables.odml.clone())),
                }
            })
            .collect();
        Self::with_adapters(adapters)
    }

    /// Registry over prebuilt adapters, in lookup order.
    pub fn with_adapters(adapters: Vec<Arc<dyn ValidatorAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn find(&self, kind: ValidatorKind) -> Option<Arc<dyn ValidatorAdapter>> {
        self.adapters.iter().find(|a| a.kind() == kind).cloned()
    }

    pub fn supports(&self, kind: ValidatorKind) -> bool {
        self.adapters.iter().any(|a| a.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<ValidatorKind> {
        self.adapters.iter().map(|a| a.kind()).collect()
    }

    pub fn adapters(&self) -> &[Arc<dyn ValidatorAdapter>] {
        &self.adapters
    }
}

/// Files under `root` with one of `extensions` (case-insensitive), skipping `.git`.
///
/// Paths are returned relative to `root`, sorted.
pub async fn collect_files(root: &Path, extensions: &'static [&'static str]) -> Vec<PathBuf> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut files: Vec<PathBuf> = WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| extensions.iter().any(|x| ext.eq_ignore_ascii_case(x)))
            })
            .filter_map(|e| e.path().strip_prefix(&root).ok().map(Path::to_path_buf))
            .collect();
        files.sort();
        files
    })
    .await
    .unwrap_or_default()
}

/// One diagnostic per output line containing a severity marker; first marker wins.
pub fn scan_markers(output: &str, markers: &[(&str, Severity)]) -> Vec<Diagnostic> {
    output
        .lines()
        .filter_map(|line| {
            markers
                .iter()
                .find(|(marker, _)| line.contains(marker))
                .map(|(_, severity)| Diagnostic {
                    severity: *severity,
                    message: line.trim().to_string(),
                    location: None,
                })
        })
        .collect()
}

/// Run `program` with `files` appended to `args` and classify its stdout by markers.
pub(crate) async fn run_marker_tool(
    program: &str,
    args: &[&str],
    root: &Path,
    files: &[PathBuf],
    markers: &[(&str, Severity)],
    executor: &CommandExecutor,
    cancel: &CancellationToken,
) -> ValidatorOutcome {
    let mut argv: Vec<std::ffi::OsString> = args.iter().map(Into::into).collect();
    argv.extend(files.iter().map(|f| f.as_os_str().to_owned()));

    let output = match executor.execute(program, &argv, Some(root), &[], cancel).await {
        Ok(output) => output,
        Err(e) => return ValidatorOutcome::from_exec_error(&e),
    };

    // Only stdout is classified; stderr is kept in the report.
    let diagnostics = scan_markers(&String::from_utf8_lossy(&output.stdout), markers);
    let mut report = output.stdout;
    report.extend_from_slice(&output.stderr);

    let mut outcome = ValidatorOutcome::from_diagnostics(diagnostics, report);
    if !output.status.success() {
        outcome.badge = Badge::Failure;
        outcome.diagnostics.push(Diagnostic::error(format!(
            "{} exited with {}",
            program, output.status
        )));
    }
    outcome
}
