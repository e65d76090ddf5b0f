use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{is_valid_revision, AccessCredential, RepoPath};
use crate::workers::executor::{CommandExecutor, ExecError};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    #[error("git {step} failed: {message}")]
    Command { step: &'static str, message: String },

    #[error("Fetch cancelled")]
    Cancelled,
}

/// Produces a checked-out working tree for a repository at a revision.
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Populate `workdir` and return the path of the checked-out tree.
    async fn fetch(
        &self,
        repo: &RepoPath,
        revision: &str,
        credential: &AccessCredential,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError>;
}

/// Clone, checkout and optional annex content retrieval through the `git` CLI.
pub struct GitFetcher {
    git: String,
    git_url: String,
    annex_content: bool,
    executor: CommandExecutor,
}

impl GitFetcher {
    pub fn new(
        git: impl Into<String>,
        git_url: impl Into<String>,
        annex_content: bool,
        executor: CommandExecutor,
    ) -> Self {
        Self {
            git: git.into(),
            git_url: git_url.into().trim_end_matches('/').to_string(),
            annex_content,
            executor,
        }
    }

    fn clone_url(&self, repo: &RepoPath) -> String {
        format!("{}/{}/{}.git", self.git_url, repo.owner, repo.repo)
    }

    /// Token travels as an HTTP header through git's environment config, never in the URL.
    fn auth_env(credential: &AccessCredential) -> Vec<(&'static str, String)> {
        vec![
            ("GIT_TERMINAL_PROMPT", "0".to_string()),
            ("GIT_CONFIG_COUNT", "1".to_string()),
            ("GIT_CONFIG_KEY_0", "http.extraHeader".to_string()),
            (
                "GIT_CONFIG_VALUE_0",
                format!("Authorization: token {}", credential.token.expose_secret()),
            ),
        ]
    }

    async fn git<S>(
        &self,
        step: &'static str,
        args: &[S],
        dir: &Path,
        envs: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<(), FetchError>
    where
        S: AsRef<std::ffi::OsStr> + std::fmt::Debug,
    {
        let output = self
            .executor
            .execute(&self.git, args, Some(dir), envs, cancel)
            .await
            .map_err(|e| match e {
                ExecError::Cancelled { .. } => FetchError::Cancelled,
                other => FetchError::Command {
                    step,
                    message: other.to_string(),
                },
            })?;

        if !output.status.success() {
            return Err(FetchError::Command {
                step,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RepositoryFetcher for GitFetcher {
    async fn fetch(
        &self,
        repo: &RepoPath,
        revision: &str,
        credential: &AccessCredential,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        if !is_valid_revision(revision) {
            return Err(FetchError::InvalidRevision(revision.to_string()));
        }

        let env = Self::auth_env(credential);
        let tree = workdir.join(&repo.repo);
        let tree_arg = tree.to_string_lossy().into_owned();
        let clone_url = self.clone_url(repo);

        tracing::info!(repository = %repo, revision, "Cloning repository");
        self.git(
            "clone",
            &["clone", "--no-checkout", clone_url.as_str(), tree_arg.as_str()],
            workdir,
            &env,
            cancel,
        )
        .await?;

        self.git("checkout", &["checkout", "--quiet", revision], &tree, &env, cancel)
            .await?;

        if self.annex_content {
            tracing::info!(repository = %repo, revision, "Fetching annexed content");
            self.git("annex get", &["annex", "get", "."], &tree, &env, cancel)
                .await?;
        }

        Ok(tree)
    }
}
