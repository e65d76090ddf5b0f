//! Client for the repository host's REST API (GIN / Gogs flavour).

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use thiserror::Error;

use crate::models::{AccessCredential, RepoPath};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote host returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Remote host request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Status { status, .. }
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
            {
                AppError::Unauthorized(anyhow::anyhow!(err))
            }
            RemoteError::Status { status, .. } if status == StatusCode::NOT_FOUND => {
                AppError::NotFound(anyhow::anyhow!(err))
            }
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub id: i64,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    pub url: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteHook {
    pub id: i64,
    pub config: HookConfig,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateHook {
    #[serde(rename = "type")]
    pub kind: String,
    pub config: HookConfig,
    pub events: Vec<String>,
    pub active: bool,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    name: String,
    sha1: String,
}

#[derive(Debug, Serialize)]
struct CreateToken<'a> {
    name: &'a str,
}

/// Operations the service needs from the repository host.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    async fn get_repository(
        &self,
        repo: &RepoPath,
        credential: &AccessCredential,
    ) -> Result<RemoteRepository, RemoteError>;

    /// Repositories the credential's user owns or can access.
    async fn list_user_repos(
        &self,
        credential: &AccessCredential,
    ) -> Result<Vec<RemoteRepository>, RemoteError>;

    async fn list_hooks(
        &self,
        repo: &RepoPath,
        credential: &AccessCredential,
    ) -> Result<Vec<RemoteHook>, RemoteError>;

    async fn create_hook(
        &self,
        repo: &RepoPath,
        hook: &CreateHook,
        credential: &AccessCredential,
    ) -> Result<RemoteHook, RemoteError>;

    async fn delete_hook(
        &self,
        repo: &RepoPath,
        hook_id: i64,
        credential: &AccessCredential,
    ) -> Result<(), RemoteError>;

    /// Exchange a username and password for an API token.
    async fn issue_token(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<AccessCredential, RemoteError>;
}

#[derive(Clone)]
pub struct GinClient {
    client: Client,
    base_url: String,
    client_id: String,
}

impl GinClient {
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder, credential: &AccessCredential) -> RequestBuilder {
        request.header(
            reqwest::header::AUTHORIZATION,
            format!("token {}", credential.token.expose_secret()),
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = %status, body = %body, "Remote host error response");
        Err(RemoteError::Status { status, body })
    }
}

#[async_trait]
impl RemoteHost for GinClient {
    async fn get_repository(
        &self,
        repo: &RepoPath,
        credential: &AccessCredential,
    ) -> Result<RemoteRepository, RemoteError> {
        let request = self.client.get(self.url(&format!("/repos/{}", repo)));
        let response = self.send(self.authorized(request, credential)).await?;
        Ok(response.json().await?)
    }

    async fn list_user_repos(
        &self,
        credential: &AccessCredential,
    ) -> Result<Vec<RemoteRepository>, RemoteError> {
        let request = self.client.get(self.url("/user/repos"));
        let response = self.send(self.authorized(request, credential)).await?;
        Ok(response.json().await?)
    }

    async fn list_hooks(
        &self,
        repo: &RepoPath,
        credential: &AccessCredential,
    ) -> Result<Vec<RemoteHook>, RemoteError> {
        let request = self.client.get(self.url(&format!("/repos/{}/hooks", repo)));
        let response = self.send(self.authorized(request, credential)).await?;
        Ok(response.json().await?)
    }

    async fn create_hook(
        &self,
        repo: &RepoPath,
        hook: &CreateHook,
        credential: &AccessCredential,
    ) -> Result<RemoteHook, RemoteError> {
        let request = self
            .client
            .post(self.url(&format!("/repos/{}/hooks", repo)))
            .json(hook);
        let response = self.send(self.authorized(request, credential)).await?;
        let created: RemoteHook = response.json().await?;
        tracing::info!(repository = %repo, hook_id = created.id, "Created remote hook");
        Ok(created)
    }

    async fn delete_hook(
        &self,
        repo: &RepoPath,
        hook_id: i64,
        credential: &AccessCredential,
    ) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(self.url(&format!("/repos/{}/hooks/{}", repo, hook_id)));
        self.send(self.authorized(request, credential)).await?;
        tracing::info!(repository = %repo, hook_id, "Deleted remote hook");
        Ok(())
    }

    async fn issue_token(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<AccessCredential, RemoteError> {
        let tokens_url = self.url(&format!("/users/{}/tokens", username));

        let request = self
            .client
            .get(&tokens_url)
            .basic_auth(username, Some(password.expose_secret()));
        let existing: Vec<AccessToken> = self.send(request).await?.json().await?;

        if let Some(token) = existing.into_iter().find(|t| t.name == self.client_id) {
            tracing::debug!(username = %username, "Reusing existing access token");
            return Ok(AccessCredential::new(username, token.sha1));
        }

        let request = self
            .client
            .post(&tokens_url)
            .basic_auth(username, Some(password.expose_secret()))
            .json(&CreateToken {
                name: &self.client_id,
            });
        let created: AccessToken = self.send(request).await?.json().await?;
        tracing::info!(username = %username, token_name = %created.name, "Issued access token");
        Ok(AccessCredential::new(username, created.sha1))
    }
}
