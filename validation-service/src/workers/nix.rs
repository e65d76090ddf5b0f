use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::executor::CommandExecutor;
use super::validator::{collect_files, run_marker_tool, ValidatorAdapter, ValidatorOutcome};
use crate::models::{Diagnostic, Severity, ValidatorKind};

const MARKERS: &[(&str, Severity)] = &[("ERROR", Severity::Error), ("WARNING", Severity::Warning)];

/// Runs `<nix> validate <files>` over every NIX file in the tree.
pub struct NixValidator {
    executable: String,
}

impl NixValidator {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

#[async_trait]
impl ValidatorAdapter for NixValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Nix
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
        let files = collect_files(root, &["nix"]).await;
        if files.is_empty() {
            let message = "No NIX files found in repository";
            return ValidatorOutcome::from_diagnostics(
                vec![Diagnostic::info(message)],
                message.as_bytes().to_vec(),
            );
        }

        tracing::debug!(files = files.len(), "Validating NIX files");
        run_marker_tool(
            &self.executable,
            &["validate"],
            root,
            &files,
            MARKERS,
            executor,
            cancel,
        )
        .await
    }
}
