use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use super::fs::write_atomic;
use crate::models::{AccessCredential, RepoPath, Session};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No {kind} record for {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Session expired")]
    Expired,

    #[error("Credential store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt {kind} record: {message}")]
    Corrupt { kind: &'static str, message: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AppError::NotFound(anyhow::anyhow!(err)),
            StoreError::Expired => AppError::Unauthorized(anyhow::anyhow!("Session expired")),
            StoreError::Io(e) => AppError::StorageError(e.into()),
            StoreError::Corrupt { .. } => AppError::StorageError(anyhow::anyhow!(err)),
        }
    }
}

/// Persistence for user credentials and the session/repository indices over them.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store or overwrite the credential for `credential.username`.
    async fn save_credential(&self, credential: &AccessCredential) -> Result<(), StoreError>;
    async fn credential(&self, username: &str) -> Result<AccessCredential, StoreError>;

    async fn link_session(&self, session: &Session) -> Result<(), StoreError>;
    async fn lookup_by_session(&self, session_id: &str) -> Result<AccessCredential, StoreError>;
    async fn unlink_session(&self, session_id: &str) -> Result<(), StoreError>;

    async fn link_repository(&self, username: &str, repo: &RepoPath) -> Result<(), StoreError>;
    async fn lookup_by_repository(&self, repo: &RepoPath) -> Result<AccessCredential, StoreError>;
    async fn unlink_repository(&self, repo: &RepoPath) -> Result<(), StoreError>;
}

#[derive(Serialize, Deserialize)]
struct CredentialRecord {
    username: String,
    token: String,
    saved_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct LinkRecord {
    username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    linked_at: DateTime<Utc>,
}

const CREDENTIALS: &str = "credentials";
const BY_SESSION: &str = "by-session";
const BY_REPO: &str = "by-repo";

/// One JSON document per key under `{root}/{credentials,by-session,by-repo}`.
///
/// File names are the unpadded URL-safe base64 of the key, so arbitrary
/// usernames and session ids map to safe names. Every write is a rename over
/// the previous record.
#[derive(Clone)]
pub struct FileCredentialStore {
    root: PathBuf,
}

impl FileCredentialStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for dir in [CREDENTIALS, BY_SESSION, BY_REPO] {
            fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self { root })
    }

    fn path(&self, index: &str, key: &str) -> PathBuf {
        self.root
            .join(index)
            .join(format!("{}.json", URL_SAFE_NO_PAD.encode(key.as_bytes())))
    }

    async fn write<T: Serialize>(
        &self,
        kind: &'static str,
        path: &Path,
        record: &T,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_vec(record).map_err(|e| StoreError::Corrupt {
            kind,
            message: e.to_string(),
        })?;
        write_atomic(path, data).await?;
        Ok(())
    }

    async fn read<T: for<'de> Deserialize<'de>>(
        &self,
        kind: &'static str,
        key: &str,
        path: &Path,
    ) -> Result<T, StoreError> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    kind,
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt {
            kind,
            message: e.to_string(),
        })
    }

    async fn remove(&self, path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn save_credential(&self, credential: &AccessCredential) -> Result<(), StoreError> {
        let record = CredentialRecord {
            username: credential.username.clone(),
            token: credential.token.expose_secret().clone(),
            saved_at: Utc::now(),
        };
        let path = self.path(CREDENTIALS, &credential.username);
        self.write("credential", &path, &record).await?;
        tracing::debug!(username = %credential.username, "Saved credential");
        Ok(())
    }

    async fn credential(&self, username: &str) -> Result<AccessCredential, StoreError> {
        let path = self.path(CREDENTIALS, username);
        let record: CredentialRecord = self.read("credential", username, &path).await?;
        Ok(AccessCredential {
            username: record.username,
            token: Secret::new(record.token),
        })
    }

    async fn link_session(&self, session: &Session) -> Result<(), StoreError> {
        let record = LinkRecord {
            username: session.username.clone(),
            expires_at: Some(session.expires_at),
            linked_at: Utc::now(),
        };
        let path = self.path(BY_SESSION, &session.id);
        self.write("session", &path, &record).await
    }

    async fn lookup_by_session(&self, session_id: &str) -> Result<AccessCredential, StoreError> {
        let path = self.path(BY_SESSION, session_id);
        // Session ids are secrets; keep them out of error messages.
        let record: LinkRecord = self.read("session", "<session>", &path).await?;

        if let Some(expires_at) = record.expires_at {
            let session = Session {
                id: session_id.to_string(),
                username: record.username.clone(),
                expires_at,
            };
            if session.is_expired() {
                self.remove(&path).await?;
                return Err(StoreError::Expired);
            }
        }

        self.credential(&record.username).await
    }

    async fn unlink_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.remove(&self.path(BY_SESSION, session_id)).await
    }

    async fn link_repository(&self, username: &str, repo: &RepoPath) -> Result<(), StoreError> {
        let record = LinkRecord {
            username: username.to_string(),
            expires_at: None,
            linked_at: Utc::now(),
        };
        let path = self.path(BY_REPO, &repo.to_string());
        self.write("repository", &path, &record).await?;
        tracing::info!(repository = %repo, username = %username, "Linked repository");
        Ok(())
    }

    async fn lookup_by_repository(&self, repo: &RepoPath) -> Result<AccessCredential, StoreError> {
        let key = repo.to_string();
        let record: LinkRecord = self
            .read("repository", &key, &self.path(BY_REPO, &key))
            .await?;
        self.credential(&record.username).await
    }

    async fn unlink_repository(&self, repo: &RepoPath) -> Result<(), StoreError> {
        self.remove(&self.path(BY_REPO, &repo.to_string())).await?;
        tracing::info!(repository = %repo, "Unlinked repository");
        Ok(())
    }
}
