use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use service_core::error::AppError;
use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::pipeline::ValidationPipeline;
use crate::config::WorkerConfig;
use crate::models::{AccessCredential, Badge, RepoPath, ValidatorKind};

#[derive(Debug, Clone)]
pub struct ValidationJob {
    pub id: Uuid,
    pub validator: ValidatorKind,
    pub repo: RepoPath,
    pub revision: String,
    pub credential: AccessCredential,
}

impl ValidationJob {
    pub fn new(
        validator: ValidatorKind,
        repo: RepoPath,
        revision: impl Into<String>,
        credential: AccessCredential,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            validator,
            repo,
            revision: revision.into(),
            credential,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            validator: self.validator,
            repo: self.repo.clone(),
        }
    }
}

/// Jobs with the same key never run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub validator: ValidatorKind,
    pub repo: RepoPath,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.validator, self.repo)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Validation queue is full")]
    QueueFull,

    #[error("Validation dispatcher is shut down")]
    ShutDown,
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        tracing::warn!(error = %err, "Rejecting validation job");
        AppError::ServiceUnavailable
    }
}

struct QueuedJob {
    job: ValidationJob,
    cancel: CancellationToken,
    done: oneshot::Sender<Badge>,
}

/// Handle to a submitted job.
pub struct JobHandle {
    pub id: Uuid,
    pub key: JobKey,
    cancel: CancellationToken,
    done: oneshot::Receiver<Badge>,
}

impl JobHandle {
    /// Request cancellation; the job still ends with a terminal failure result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the terminal badge.
    pub async fn wait(self) -> Result<Badge, DispatchError> {
        self.done.await.map_err(|_| DispatchError::ShutDown)
    }
}

/// A reserved queue slot. Dropping it releases the slot.
pub struct JobSlot {
    permit: mpsc::OwnedPermit<QueuedJob>,
    shutdown: CancellationToken,
}

impl JobSlot {
    pub fn submit(self, job: ValidationJob) -> JobHandle {
        let cancel = self.shutdown.child_token();
        let (done_tx, done_rx) = oneshot::channel();
        let handle = JobHandle {
            id: job.id,
            key: job.key(),
            cancel: cancel.clone(),
            done: done_rx,
        };

        tracing::info!(job_id = %job.id, key = %handle.key, revision = %job.revision, "Queued validation job");
        self.permit.send(QueuedJob {
            job,
            cancel,
            done: done_tx,
        });
        handle
    }
}

/// Bounded queue in front of a fixed-size pool of pipeline runs.
///
/// Jobs sharing a [`JobKey`] run one after another in submission order; jobs
/// with different keys run concurrently up to `worker_count`.
#[derive(Clone)]
pub struct JobDispatcher {
    tx: mpsc::Sender<QueuedJob>,
    shutdown: CancellationToken,
}

impl JobDispatcher {
    /// Spawn the distributor task and return the submission side.
    pub fn start(config: &WorkerConfig, pipeline: Arc<ValidationPipeline>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let shutdown = CancellationToken::new();
        let distributor = Distributor {
            pipeline,
            workers: Arc::new(Semaphore::new(config.worker_count.max(1))),
            pending: Arc::new(DashMap::new()),
        };

        tracing::info!(
            worker_count = config.worker_count,
            queue_size = config.queue_size,
            "Starting validation workers"
        );
        tokio::spawn(distributor.run(rx, shutdown.clone()));

        Self { tx, shutdown }
    }

    /// Reserve a queue slot without blocking.
    pub fn reserve(&self) -> Result<JobSlot, DispatchError> {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::ShutDown);
        }
        let permit = self.tx.clone().try_reserve_owned().map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::ShutDown,
        })?;
        Ok(JobSlot {
            permit,
            shutdown: self.shutdown.clone(),
        })
    }

    pub fn submit(&self, job: ValidationJob) -> Result<JobHandle, DispatchError> {
        Ok(self.reserve()?.submit(job))
    }

    /// Cancel every queued and running job. Each still records a failure result.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down validation dispatcher");
        self.shutdown.cancel();
    }
}

struct Distributor {
    pipeline: Arc<ValidationPipeline>,
    workers: Arc<Semaphore>,
    pending: Arc<DashMap<JobKey, VecDeque<QueuedJob>>>,
}

impl Distributor {
    async fn run(self, mut rx: mpsc::Receiver<QueuedJob>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(queued) => self.dispatch(queued),
                    None => break,
                },
            }
        }

        // Drain so every accepted job reaches a terminal result.
        rx.close();
        while let Some(queued) = rx.recv().await {
            self.dispatch(queued);
        }
        tracing::info!("Validation job distributor stopped");
    }

    fn dispatch(&self, queued: QueuedJob) {
        let key = queued.job.key();
        match self.pending.entry(key.clone()) {
            Entry::Occupied(mut waiting) => {
                tracing::debug!(job_id = %queued.job.id, key = %key, "Waiting for running job with same key");
                waiting.get_mut().push_back(queued);
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::new());
                let runner = KeyRunner {
                    key,
                    pipeline: self.pipeline.clone(),
                    workers: self.workers.clone(),
                    pending: self.pending.clone(),
                };
                tokio::spawn(runner.run(queued));
            }
        }
    }
}

/// Runs the jobs of one key back to back until its pending queue is empty.
struct KeyRunner {
    key: JobKey,
    pipeline: Arc<ValidationPipeline>,
    workers: Arc<Semaphore>,
    pending: Arc<DashMap<JobKey, VecDeque<QueuedJob>>>,
}

impl KeyRunner {
    async fn run(self, first: QueuedJob) {
        let mut next = Some(first);
        while let Some(queued) = next {
            let badge = match self.workers.clone().acquire_owned().await {
                Ok(_permit) => self.run_guarded(&queued).await,
                Err(_) => Badge::Failure,
            };
            let _ = queued.done.send(badge);
            next = self.pop_next();
        }
    }

    /// A panicking run still ends in a failure result and frees the key.
    async fn run_guarded(&self, queued: &QueuedJob) -> Badge {
        let run = self.pipeline.run(&queued.job, &queued.cancel);
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(badge) => badge,
            Err(_) => {
                tracing::error!(job_id = %queued.job.id, key = %self.key, "Validation job panicked");
                self.pipeline.record_crash(&queued.job).await
            }
        }
    }

    fn pop_next(&self) -> Option<QueuedJob> {
        match self.pending.entry(self.key.clone()) {
            Entry::Occupied(mut waiting) => match waiting.get_mut().pop_front() {
                Some(queued) => Some(queued),
                None => {
                    waiting.remove();
                    None
                }
            },
            Entry::Vacant(_) => None,
        }
    }
}
