//! In-process stand-ins for the remote host, git and validator tools.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::Secret;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::dispatcher::ValidationJob;
use super::executor::CommandExecutor;
use super::pipeline::ValidationPipeline;
use super::validator::{ValidatorAdapter, ValidatorOutcome, ValidatorRegistry};
use crate::config::Labels;
use crate::models::{AccessCredential, RepoPath, ValidatorKind};
use crate::services::remote::{CreateHook, RemoteHook, RemoteRepository};
use crate::services::{FetchError, RemoteError, RemoteHost, RepositoryFetcher, ResultStore};

pub struct FakeRemote {
    pub accessible: bool,
}

fn not_found() -> RemoteError {
    RemoteError::Status {
        status: StatusCode::NOT_FOUND,
        body: "not found".to_string(),
    }
}

#[async_trait]
impl RemoteHost for FakeRemote {
    async fn get_repository(
        &self,
        repo: &RepoPath,
        _credential: &AccessCredential,
    ) -> Result<RemoteRepository, RemoteError> {
        if !self.accessible {
            return Err(not_found());
        }
        Ok(RemoteRepository {
            id: 1,
            full_name: repo.to_string(),
            private: false,
        })
    }

    async fn list_user_repos(
        &self,
        _credential: &AccessCredential,
    ) -> Result<Vec<RemoteRepository>, RemoteError> {
        Ok(Vec::new())
    }

    async fn list_hooks(
        &self,
        _repo: &RepoPath,
        _credential: &AccessCredential,
    ) -> Result<Vec<RemoteHook>, RemoteError> {
        Ok(Vec::new())
    }

    async fn create_hook(
        &self,
        _repo: &RepoPath,
        _hook: &CreateHook,
        _credential: &AccessCredential,
    ) -> Result<RemoteHook, RemoteError> {
        Err(not_found())
    }

    async fn delete_hook(
        &self,
        _repo: &RepoPath,
        _hook_id: i64,
        _credential: &AccessCredential,
    ) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn issue_token(
        &self,
        username: &str,
        _password: &Secret<String>,
    ) -> Result<AccessCredential, RemoteError> {
        Ok(AccessCredential::new(username, "token"))
    }
}

/// Lays down a one-file tree once its gate hands out a permit.
///
/// Fetches of `fail_revision` return an error and fetches of
/// `panic_revision` panic. Every started fetch is recorded in order.
pub struct FakeFetcher {
    pub gate: Arc<Semaphore>,
    pub fail_revision: Option<&'static str>,
    pub panic_revision: Option<&'static str>,
    pub fetched: Mutex<Vec<String>>,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl FakeFetcher {
    pub fn open() -> Self {
        Self::with_gate(Semaphore::MAX_PERMITS)
    }

    /// Each fetch waits for one `gate.add_permits(1)`.
    pub fn gated() -> Self {
        Self::with_gate(0)
    }

    fn with_gate(permits: usize) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(permits)),
            fail_revision: None,
            panic_revision: None,
            fetched: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositoryFetcher for FakeFetcher {
    async fn fetch(
        &self,
        repo: &RepoPath,
        revision: &str,
        _credential: &AccessCredential,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            permit = self.gate.acquire() => permit.unwrap().forget(),
        }

        self.fetched.lock().unwrap().push(revision.to_string());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.panic_revision == Some(revision) {
            panic!("fetcher blew up on {revision}");
        }
        if self.fail_revision == Some(revision) {
            return Err(FetchError::Command {
                step: "clone",
                message: "repository not found".to_string(),
            });
        }

        let tree = workdir.join(&repo.repo);
        tokio::fs::create_dir_all(&tree).await.unwrap();
        tokio::fs::write(tree.join("README"), b"data").await.unwrap();
        Ok(tree)
    }
}

pub enum AdapterMode {
    Clean,
    Panic,
    /// Run a real program in the tree and report its stdout.
    Command(&'static str, &'static [&'static str]),
}

pub struct FakeAdapter {
    pub mode: AdapterMode,
}

#[async_trait]
impl ValidatorAdapter for FakeAdapter {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Bids
    }

    fn executable(&self) -> &str {
        "fake-validator"
    }

    async fn run(
        &self,
        root: &Path,
        executor: &CommandExecutor,
        cancel: &CancellationToken,
    ) -> ValidatorOutcome {
        match self.mode {
            AdapterMode::Clean => ValidatorOutcome::from_diagnostics(Vec::new(), b"clean".to_vec()),
            AdapterMode::Panic => panic!("validator blew up"),
            AdapterMode::Command(program, args) => {
                match executor.execute(program, args, Some(root), &[], cancel).await {
                    Ok(output) => ValidatorOutcome::from_diagnostics(Vec::new(), output.stdout),
                    Err(e) => ValidatorOutcome::from_exec_error(&e),
                }
            }
        }
    }
}

pub fn pipeline(
    home: &Path,
    remote: FakeRemote,
    fetcher: Arc<FakeFetcher>,
    mode: AdapterMode,
    timeout: Duration,
) -> (Arc<ValidationPipeline>, ResultStore) {
    let results = ResultStore::new(home.join("results"), Labels::default());
    let adapter: Arc<dyn ValidatorAdapter> = Arc::new(FakeAdapter { mode });
    let registry = Arc::new(ValidatorRegistry::with_adapters(vec![adapter]));
    let pipeline = ValidationPipeline::new(
        results.clone(),
        Arc::new(remote),
        fetcher,
        registry,
        CommandExecutor::new(timeout),
        home.join("tmp"),
    );
    (Arc::new(pipeline), results)
}

pub fn job(repo: &str, revision: &str) -> ValidationJob {
    ValidationJob::new(
        ValidatorKind::Bids,
        RepoPath::new("alice", repo).unwrap(),
        revision,
        AccessCredential::new("alice", "token"),
    )
}
