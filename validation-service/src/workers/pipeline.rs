use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::dispatcher::ValidationJob;
use super::executor::CommandExecutor;
use super::validator::{ValidatorOutcome, ValidatorRegistry};
use crate::models::{Badge, ResultRecord};
use crate::services::{RemoteHost, RepositoryFetcher, ResultStore};

/// Clone, check out, validate and persist one revision.
pub struct ValidationPipeline {
    results: ResultStore,
    remote: Arc<dyn RemoteHost>,
    fetcher: Arc<dyn RepositoryFetcher>,
    registry: Arc<ValidatorRegistry>,
    executor: CommandExecutor,
    temp_dir: PathBuf,
}

/// Where a job stopped, if it did not reach the validator.
enum Stage {
    Validated(ValidatorOutcome),
    Aborted(String),
}

impl ValidationPipeline {
    pub fn new(
        results: ResultStore,
        remote: Arc<dyn RemoteHost>,
        fetcher: Arc<dyn RepositoryFetcher>,
        registry: Arc<ValidatorRegistry>,
        executor: CommandExecutor,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            results,
            remote,
            fetcher,
            registry,
            executor,
            temp_dir: temp_dir.into(),
        }
    }

    /// Run the job to a terminal badge. Every outcome is written to the result store.
    pub async fn run(&self, job: &ValidationJob, cancel: &CancellationToken) -> Badge {
        let span = tracing::info_span!(
            "validation_job",
            job_id = %job.id,
            validator = %job.validator,
            repository = %job.repo,
            revision = %job.revision,
        );
        self.run_job(job, cancel).instrument(span).await
    }

    async fn run_job(&self, job: &ValidationJob, cancel: &CancellationToken) -> Badge {
        let start = Instant::now();
        let validator = job.validator.as_str();
        metrics::counter!("validation_jobs_total", "validator" => validator).increment(1);
        tracing::info!("Validation job started");

        let stage = self.execute(job, cancel).await;

        let (outcome, publish) = match stage {
            Stage::Validated(outcome) => (outcome, true),
            Stage::Aborted(message) => {
                tracing::error!(error = %message, "Validation job aborted");
                (ValidatorOutcome::failure(message), false)
            }
        };
        self.finish(job, outcome, publish, start).await
    }

    /// Record a failure for a job whose run panicked. `latest` is left alone.
    pub(crate) async fn record_crash(&self, job: &ValidationJob) -> Badge {
        let outcome = ValidatorOutcome::failure("Validation job crashed");
        self.finish(job, outcome, false, Instant::now()).await
    }

    async fn finish(
        &self,
        job: &ValidationJob,
        outcome: ValidatorOutcome,
        publish: bool,
        start: Instant,
    ) -> Badge {
        let validator = job.validator.as_str();
        let badge = outcome.badge;

        let record = ResultRecord {
            validator: job.validator,
            owner: job.repo.owner.clone(),
            repo: job.repo.repo.clone(),
            revision: job.revision.clone(),
            badge,
            timestamp: Utc::now(),
            diagnostics: outcome.diagnostics,
        };

        if let Err(e) = self.results.write_result(&record, outcome.report).await {
            tracing::error!(error = %e, "Failed to persist validation result");
        }
        if publish {
            if let Err(e) = self
                .results
                .update_latest(job.validator, &job.repo, &job.revision)
                .await
            {
                tracing::error!(error = %e, "Failed to update latest result");
            }
        }

        metrics::counter!(
            "validation_jobs_completed",
            "validator" => validator,
            "badge" => badge.as_str()
        )
        .increment(1);
        metrics::histogram!("validation_job_duration_seconds", "validator" => validator)
            .record(start.elapsed().as_secs_f64());

        tracing::info!(
            badge = %badge,
            duration_ms = start.elapsed().as_millis() as u64,
            "Validation job finished"
        );
        badge
    }

    async fn execute(&self, job: &ValidationJob, cancel: &CancellationToken) -> Stage {
        if cancel.is_cancelled() {
            return Stage::Aborted("Validation cancelled before start".to_string());
        }

        let Some(adapter) = self.registry.find(job.validator) else {
            return Stage::Aborted(format!("Validator {} is not available", job.validator));
        };

        if let Err(e) = self.remote.get_repository(&job.repo, &job.credential).await {
            return Stage::Aborted(format!("Repository {} is not accessible: {}", job.repo, e));
        }

        let workdir = match create_workdir(&self.temp_dir).await {
            Ok(dir) => dir,
            Err(e) => return Stage::Aborted(format!("Failed to create working directory: {}", e)),
        };

        let stage = match self
            .fetcher
            .fetch(&job.repo, &job.revision, &job.credential, workdir.path(), cancel)
            .await
        {
            Ok(tree) => {
                let run = adapter.run(&tree, &self.executor, cancel);
                match AssertUnwindSafe(run).catch_unwind().await {
                    Ok(outcome) => Stage::Validated(outcome),
                    Err(_) => Stage::Validated(ValidatorOutcome::failure(format!(
                        "{} validator crashed",
                        job.validator
                    ))),
                }
            }
            Err(e) => Stage::Aborted(format!("Failed to fetch repository: {}", e)),
        };

        remove_workdir(workdir).await;
        stage
    }
}

async fn create_workdir(temp_dir: &Path) -> std::io::Result<tempfile::TempDir> {
    tokio::fs::create_dir_all(temp_dir).await?;
    let temp_dir = temp_dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix("validation-")
            .tempdir_in(temp_dir)
    })
    .await
    .map_err(std::io::Error::other)?
}

async fn remove_workdir(workdir: tempfile::TempDir) {
    let path = workdir.path().to_path_buf();
    match tokio::task::spawn_blocking(move || workdir.close()).await {
        Ok(Ok(())) => tracing::debug!(path = %path.display(), "Removed working directory"),
        Ok(Err(e)) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove working directory")
        }
        Err(e) => tracing::warn!(error = %e, "Working directory cleanup task failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RepoPath, Severity, ValidatorKind};
    use crate::workers::test_support::{job, pipeline, AdapterMode, FakeFetcher, FakeRemote};
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn latest_of(home: &Path, repo: &str) -> Option<String> {
        std::fs::read_link(home.join("results/bids/alice").join(repo).join("latest"))
            .ok()
            .map(|target| target.to_string_lossy().into_owned())
    }

    async fn stored_badge(results: &ResultStore, repo: &str, revision: &str) -> Badge {
        results
            .read(
                ValidatorKind::Bids,
                &RepoPath::new("alice", repo).unwrap(),
                Some(revision),
            )
            .await
            .unwrap()
            .expect("result should be written")
            .record
            .badge
    }

    #[tokio::test]
    async fn clean_run_publishes_latest() {
        let home = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::open());
        let (pipeline, results) = pipeline(
            home.path(),
            FakeRemote { accessible: true },
            fetcher,
            AdapterMode::Clean,
            TIMEOUT,
        );

        let badge = pipeline
            .run(&job("ds001", "abc123"), &CancellationToken::new())
            .await;

        assert_eq!(badge, Badge::Success);
        assert_eq!(stored_badge(&results, "ds001", "abc123").await, Badge::Success);
        assert_eq!(latest_of(home.path(), "ds001").as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn validator_panic_is_recorded_as_failure() {
        let home = tempfile::tempdir().unwrap();
        let (pipeline, results) = pipeline(
            home.path(),
            FakeRemote { accessible: true },
            Arc::new(FakeFetcher::open()),
            AdapterMode::Panic,
            TIMEOUT,
        );

        let badge = pipeline
            .run(&job("ds001", "abc123"), &CancellationToken::new())
            .await;

        assert_eq!(badge, Badge::Failure);
        let stored = results
            .read(
                ValidatorKind::Bids,
                &RepoPath::new("alice", "ds001").unwrap(),
                Some("abc123"),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(stored.record.diagnostics[0].message.contains("crashed"));
        // The validator ran, so its verdict is the latest one.
        assert_eq!(latest_of(home.path(), "ds001").as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn fetch_failure_keeps_previous_latest() {
        let home = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            fail_revision: Some("bbbb2222"),
            ..FakeFetcher::open()
        });
        let (pipeline, results) = pipeline(
            home.path(),
            FakeRemote { accessible: true },
            fetcher,
            AdapterMode::Clean,
            TIMEOUT,
        );
        let cancel = CancellationToken::new();

        assert_eq!(pipeline.run(&job("ds001", "aaaa1111"), &cancel).await, Badge::Success);
        assert_eq!(pipeline.run(&job("ds001", "bbbb2222"), &cancel).await, Badge::Failure);

        assert_eq!(stored_badge(&results, "ds001", "bbbb2222").await, Badge::Failure);
        assert_eq!(latest_of(home.path(), "ds001").as_deref(), Some("aaaa1111"));
    }

    #[tokio::test]
    async fn inaccessible_repository_is_not_fetched() {
        let home = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::open());
        let (pipeline, results) = pipeline(
            home.path(),
            FakeRemote { accessible: false },
            fetcher.clone(),
            AdapterMode::Clean,
            TIMEOUT,
        );

        let badge = pipeline
            .run(&job("ds001", "abc123"), &CancellationToken::new())
            .await;

        assert_eq!(badge, Badge::Failure);
        assert!(fetcher.fetched().is_empty());
        assert_eq!(stored_badge(&results, "ds001", "abc123").await, Badge::Failure);
        assert_eq!(latest_of(home.path(), "ds001"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn validator_timeout_is_terminal_failure() {
        let home = tempfile::tempdir().unwrap();
        let (pipeline, results) = pipeline(
            home.path(),
            FakeRemote { accessible: true },
            Arc::new(FakeFetcher::open()),
            AdapterMode::Command("sleep", &["5"]),
            Duration::from_millis(200),
        );

        let badge = pipeline
            .run(&job("ds001", "abc123"), &CancellationToken::new())
            .await;

        assert_eq!(badge, Badge::Failure);
        let stored = results
            .read(
                ValidatorKind::Bids,
                &RepoPath::new("alice", "ds001").unwrap(),
                Some("abc123"),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(stored.record.badge.is_terminal());
        assert_eq!(stored.record.diagnostics[0].severity, Severity::Error);
        assert!(stored.record.diagnostics[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn cancelled_job_never_starts() {
        let home = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::open());
        let (pipeline, _) = pipeline(
            home.path(),
            FakeRemote { accessible: true },
            fetcher.clone(),
            AdapterMode::Clean,
            TIMEOUT,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(pipeline.run(&job("ds001", "abc123"), &cancel).await, Badge::Failure);
        assert!(fetcher.fetched().is_empty());
    }

    #[tokio::test]
    async fn crash_record_leaves_latest_alone() {
        let home = tempfile::tempdir().unwrap();
        let (pipeline, results) = pipeline(
            home.path(),
            FakeRemote { accessible: true },
            Arc::new(FakeFetcher::open()),
            AdapterMode::Clean,
            TIMEOUT,
        );

        assert_eq!(pipeline.record_crash(&job("ds001", "dead01")).await, Badge::Failure);
        assert_eq!(stored_badge(&results, "ds001", "dead01").await, Badge::Failure);
        assert_eq!(latest_of(home.path(), "ds001"), None);
    }
}
