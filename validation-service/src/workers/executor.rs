use std::ffi::OsStr;
use std::fmt::Debug;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs} seconds")]
    TimedOut { program: String, secs: u64 },

    #[error("{program} was cancelled")]
    Cancelled { program: String },
}

/// Runs external programs with a deadline and a cancellation token.
///
/// The child is killed when either fires. Exit status is not interpreted;
/// callers decide what a nonzero exit means.
#[derive(Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Environment values are passed to the child but never logged.
    pub async fn execute<S>(
        &self,
        program: &str,
        args: &[S],
        working_dir: Option<&Path>,
        envs: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<Output, ExecError>
    where
        S: AsRef<OsStr> + Debug,
    {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in envs {
            cmd.env(key, value);
        }

        tracing::debug!(
            program = %program,
            args = ?args,
            timeout_secs = %self.timeout.as_secs(),
            "Executing command"
        );

        let output = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::warn!(program = %program, "Command cancelled");
                return Err(ExecError::Cancelled { program: program.to_string() });
            }
            result = tokio::time::timeout(self.timeout, cmd.output()) => match result {
                Ok(output) => output.map_err(|source| ExecError::Spawn {
                    program: program.to_string(),
                    source,
                })?,
                Err(_) => {
                    tracing::error!(
                        program = %program,
                        timeout_secs = self.timeout.as_secs(),
                        "Command timed out"
                    );
                    return Err(ExecError::TimedOut {
                        program: program.to_string(),
                        secs: self.timeout.as_secs(),
                    });
                }
            },
        };

        if output.status.success() {
            tracing::debug!(
                program = %program,
                output_size = output.stdout.len(),
                "Command succeeded"
            );
        } else {
            tracing::warn!(
                program = %program,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Command exited unsuccessfully"
            );
        }

        Ok(output)
    }
}
