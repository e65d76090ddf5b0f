use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::executor::CommandExecutor;
use super::validator::{collect_files, run_marker_tool, ValidatorAdapter, ValidatorOutcome};
use crate::models::{Diagnostic, Severity, ValidatorKind};

const MARKERS: &[(&str, Severity)] = &[
    ("[error]", Severity::Error),
    ("[fatal]", Severity::Error),
    ("[warning]", Severity::Warning),
];

/// Runs the odML validator over `.odml` and `.xml` files.
pub struct OdmlValidator {
    executable: String,
}

impl OdmlValidator {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

#[async_trait]
impl ValidatorAdapter for OdmlValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Odml
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
        let files = collect_files(root, &["odml", "xml"]).await;
        if files.is_empty() {
            let message = "No odML files found in repository";
            return ValidatorOutcome::from_diagnostics(
                vec![Diagnostic::info(message)],
                message.as_bytes().to_vec(),
            );
        }

        run_marker_tool(&self.executable, &[], root, &files, MARKERS, executor, cancel).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::Badge;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn script(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-odml.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    async fn run_with(body: &str) -> ValidatorOutcome {
        let tools = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("meta.odml"), b"<odML/>").unwrap();

        OdmlValidator::new(script(tools.path(), body))
            .run(
                repo.path(),
                &CommandExecutor::new(Duration::from_secs(5)),
                &CancellationToken::new(),
            )
            .await
    }

    #[tokio::test]
    async fn warning_markers_give_warning() {
        let outcome = run_with("echo \"[warning] section without type: $1\"").await;
        assert_eq!(outcome.badge, Badge::Warning);
        assert!(String::from_utf8_lossy(&outcome.report).contains("meta.odml"));
    }

    #[tokio::test]
    async fn fatal_marker_gives_failure() {
        let outcome = run_with("echo '[fatal] cannot parse'").await;
        assert_eq!(outcome.badge, Badge::Failure);
    }

    #[tokio::test]
    async fn clean_output_is_success() {
        let outcome = run_with("echo 'all good'").await;
        assert_eq!(outcome.badge, Badge::Success);
    }

    #[tokio::test]
    async fn stderr_noise_does_not_change_badge() {
        let outcome = run_with("echo 'all good'; echo '[warning] logging noise' >&2").await;
        assert_eq!(outcome.badge, Badge::Success);
        assert!(outcome.diagnostics.is_empty());
        assert!(String::from_utf8_lossy(&outcome.report).contains("logging noise"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let outcome = run_with("exit 2").await;
        assert_eq!(outcome.badge, Badge::Failure);
    }
}
