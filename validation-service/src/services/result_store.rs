use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::badges;
use super::fs::{replace_symlink, write_atomic};
use crate::config::Labels;
use crate::models::repository::check_segment;
use crate::models::{Badge, HistoryEntry, RepoPath, ResultRecord, StoredResult, ValidatorKind};

pub const IN_PROGRESS_REPORT: &str = "Validation in progress";

/// Directory-per-revision result persistence.
///
/// Layout: `{root}/{validator}/{owner}/{repo}/{revision}/{report,badge,meta}`
/// with `{root}/{validator}/{owner}/{repo}/latest` pointing at the most
/// recently completed revision.
#[derive(Clone)]
pub struct ResultStore {
    root: PathBuf,
    labels: Labels,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>, labels: Labels) -> Self {
        Self {
            root: root.into(),
            labels,
        }
    }

    fn repo_dir(&self, validator: ValidatorKind, owner: &str, repo: &str) -> Result<PathBuf, AppError> {
        check_segment("owner", owner).map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;
        check_segment("repository", repo).map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;
        Ok(self.root.join(validator.as_str()).join(owner).join(repo))
    }

    fn revision_dir(
        &self,
        validator: ValidatorKind,
        owner: &str,
        repo: &str,
        revision: &str,
    ) -> Result<PathBuf, AppError> {
        check_segment("revision", revision).map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;
        Ok(self.repo_dir(validator, owner, repo)?.join(revision))
    }

    /// Publish the in-progress placeholder for a revision.
    pub async fn write_in_progress(
        &self,
        validator: ValidatorKind,
        repo: &RepoPath,
        revision: &str,
    ) -> Result<(), AppError> {
        let record = ResultRecord {
            validator,
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            revision: revision.to_string(),
            badge: Badge::InProgress,
            timestamp: Utc::now(),
            diagnostics: Vec::new(),
        };
        self.write_result(&record, IN_PROGRESS_REPORT.as_bytes().to_vec())
            .await
    }

    /// Write report, badge image and metadata for `record.revision`.
    ///
    /// All three files are attempted even when one fails; the first error is returned.
    pub async fn write_result(&self, record: &ResultRecord, report: Vec<u8>) -> Result<(), AppError> {
        let dir = self.revision_dir(record.validator, &record.owner, &record.repo, &record.revision)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::StorageError(e.into()))?;

        let meta = serde_json::to_vec_pretty(record).map_err(|e| AppError::InternalError(e.into()))?;
        let writes = [
            (&self.labels.results_file, report),
            (&self.labels.results_badge, badges::svg(record.badge).as_bytes().to_vec()),
            (&self.labels.results_meta, meta),
        ];

        let mut first_error = None;
        for (name, data) in writes {
            let path = dir.join(name);
            if let Err(e) = write_atomic(&path, data).await {
                tracing::error!(path = %path.display(), error = %e, "Failed to write result file");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(AppError::StorageError(e.into())),
            None => Ok(()),
        }
    }

    /// Atomically repoint `latest` at `revision`.
    pub async fn update_latest(
        &self,
        validator: ValidatorKind,
        repo: &RepoPath,
        revision: &str,
    ) -> Result<(), AppError> {
        let target = self.revision_dir(validator, &repo.owner, &repo.repo, revision)?;
        if !fs::try_exists(&target).await.unwrap_or(false) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "No result directory for revision {}",
                revision
            )));
        }

        let link = self
            .repo_dir(validator, &repo.owner, &repo.repo)?
            .join(&self.labels.results_folder);
        replace_symlink(Path::new(revision), &link)
            .await
            .map_err(|e| AppError::StorageError(e.into()))?;

        tracing::debug!(repository = %repo, validator = %validator, revision, "Updated latest result");
        Ok(())
    }

    /// Load a stored result.
    ///
    /// Without an explicit revision the newest history entry is used, so a
    /// running job is visible, falling back to `latest`.
    pub async fn read(
        &self,
        validator: ValidatorKind,
        repo: &RepoPath,
        revision: Option<&str>,
    ) -> Result<Option<StoredResult>, AppError> {
        let dir = match revision {
            Some(rev) => self.revision_dir(validator, &repo.owner, &repo.repo, rev)?,
            None => {
                let history = self.history(validator, repo).await?;
                let rev = history
                    .first()
                    .map(|entry| entry.revision.as_str())
                    .unwrap_or(self.labels.results_folder.as_str());
                self.revision_dir(validator, &repo.owner, &repo.repo, rev)?
            }
        };

        let Some(meta) = read_optional(&dir.join(&self.labels.results_meta)).await? else {
            return Ok(None);
        };
        let record: ResultRecord = serde_json::from_slice(&meta).map_err(|e| {
            AppError::StorageError(anyhow::anyhow!(
                "Corrupt result metadata in {}: {}",
                dir.display(),
                e
            ))
        })?;
        let report = read_optional(&dir.join(&self.labels.results_file))
            .await?
            .unwrap_or_default();

        Ok(Some(StoredResult { record, report }))
    }

    /// Badge image of the revision `latest` points at.
    pub async fn latest_badge(
        &self,
        validator: ValidatorKind,
        repo: &RepoPath,
    ) -> Result<Option<Vec<u8>>, AppError> {
        let path = self
            .repo_dir(validator, &repo.owner, &repo.repo)?
            .join(&self.labels.results_folder)
            .join(&self.labels.results_badge);
        read_optional(&path).await
    }

    /// Revision directories, most recently modified first.
    pub async fn history(
        &self,
        validator: ValidatorKind,
        repo: &RepoPath,
    ) -> Result<Vec<HistoryEntry>, AppError> {
        let dir = self.repo_dir(validator, &repo.owner, &repo.repo)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::StorageError(e.into())),
        };

        let mut history = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::StorageError(e.into()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name == self.labels.results_folder {
                continue;
            }
            // DirEntry::metadata does not follow symlinks.
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_dir() => m,
                _ => continue,
            };
            let modified: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());

            let badge = match read_optional(&entry.path().join(&self.labels.results_meta)).await {
                Ok(Some(meta)) => serde_json::from_slice::<ResultRecord>(&meta)
                    .map(|r| r.badge)
                    .unwrap_or(Badge::Unavailable),
                _ => Badge::Unavailable,
            };

            history.push(HistoryEntry {
                revision: name,
                badge,
                modified,
            });
        }

        history.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.revision.cmp(&b.revision))
        });
        Ok(history)
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, AppError> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::StorageError(e.into())),
    }
}
