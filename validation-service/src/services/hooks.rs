use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use std::sync::Arc;

use super::credential_store::CredentialStore;
use super::remote::{CreateHook, HookConfig, RemoteHook, RemoteHost};
use crate::models::{
    AccessCredential, HookRegistration, HookState, RepoPath, RepositoryHooks, ValidatorKind,
};

/// Registers validation hooks on the remote host and keeps repository bindings in step.
#[derive(Clone)]
pub struct HookManager {
    remote: Arc<dyn RemoteHost>,
    credentials: Arc<dyn CredentialStore>,
    root_url: String,
    secret: Secret<String>,
    validators: Vec<ValidatorKind>,
}

impl HookManager {
    pub fn new(
        remote: Arc<dyn RemoteHost>,
        credentials: Arc<dyn CredentialStore>,
        root_url: impl Into<String>,
        secret: Secret<String>,
        validators: Vec<ValidatorKind>,
    ) -> Self {
        Self {
            remote,
            credentials,
            root_url: root_url.into().trim_end_matches('/').to_string(),
            secret,
            validators,
        }
    }

    pub fn hook_url(&self, repo: &RepoPath, validator: ValidatorKind) -> String {
        format!(
            "{}/validate/{}/{}/{}",
            self.root_url, validator, repo.owner, repo.repo
        )
    }

    /// Create a push hook for `validator` and bind the repository to the caller's credential.
    pub async fn enable(
        &self,
        repo: &RepoPath,
        validator: ValidatorKind,
        credential: &AccessCredential,
    ) -> Result<HookRegistration, AppError> {
        if !self.validators.contains(&validator) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Unsupported validator: {}",
                validator
            )));
        }

        let hook = CreateHook {
            kind: "gogs".to_string(),
            config: HookConfig {
                url: self.hook_url(repo, validator),
                content_type: "json".to_string(),
                secret: Some(self.secret.expose_secret().clone()),
            },
            events: vec!["push".to_string()],
            active: true,
        };

        let created = self.remote.create_hook(repo, &hook, credential).await?;
        self.credentials
            .link_repository(&credential.username, repo)
            .await?;

        tracing::info!(
            repository = %repo,
            validator = %validator,
            hook_id = created.id,
            username = %credential.username,
            "Enabled validation hook"
        );

        Ok(HookRegistration {
            repository: repo.clone(),
            validator,
            hook_id: Some(created.id),
            state: HookState::Enabled,
        })
    }

    /// Delete the remote hook and drop the repository binding.
    pub async fn disable(
        &self,
        repo: &RepoPath,
        hook_id: i64,
        credential: &AccessCredential,
    ) -> Result<(), AppError> {
        self.remote.delete_hook(repo, hook_id, credential).await?;
        self.credentials.unlink_repository(repo).await?;

        tracing::info!(repository = %repo, hook_id, "Disabled validation hook");
        Ok(())
    }

    /// Hook state for every supported validator on `repo`.
    pub async fn hooks(
        &self,
        repo: &RepoPath,
        credential: &AccessCredential,
    ) -> Result<Vec<HookRegistration>, AppError> {
        let remote_hooks = self.remote.list_hooks(repo, credential).await?;
        let mut registrations = self.unregistered(repo);

        for hook in &remote_hooks {
            let Some(validator) = validator_for_url(&self.root_url, &hook.config.url) else {
                continue;
            };
            if let Some(entry) = registrations.iter_mut().find(|r| r.validator == validator) {
                // An enabled hook wins over a disabled duplicate.
                if entry.state != HookState::Enabled {
                    entry.hook_id = Some(hook.id);
                    entry.state = hook_state(hook);
                }
            }
        }

        Ok(registrations)
    }

    /// The caller's repositories, each with its hook states.
    ///
    /// A repository whose hooks cannot be read is listed with no hooks.
    pub async fn repositories(
        &self,
        credential: &AccessCredential,
    ) -> Result<Vec<RepositoryHooks>, AppError> {
        let repositories = self.remote.list_user_repos(credential).await?;

        let mut listing = Vec::with_capacity(repositories.len());
        for repository in repositories {
            let path = match RepoPath::parse(&repository.full_name) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(repository = %repository.full_name, error = %e, "Skipping repository with unusable name");
                    continue;
                }
            };
            let hooks = match self.hooks(&path, credential).await {
                Ok(hooks) => hooks,
                Err(e) => {
                    tracing::warn!(repository = %path, error = %e, "Failed to read repository hooks");
                    self.unregistered(&path)
                }
            };
            listing.push(RepositoryHooks {
                repository: path,
                private: repository.private,
                hooks,
            });
        }

        Ok(listing)
    }

    fn unregistered(&self, repo: &RepoPath) -> Vec<HookRegistration> {
        self.validators
            .iter()
            .map(|&validator| HookRegistration {
                repository: repo.clone(),
                validator,
                hook_id: None,
                state: HookState::None,
            })
            .collect()
    }
}

fn hook_state(hook: &RemoteHook) -> HookState {
    if hook.active && hook.events.iter().any(|e| e == "push") {
        HookState::Enabled
    } else {
        HookState::Disabled
    }
}

/// Extract the validator from a `{root_url}/validate/{validator}/{owner}/{repo}` hook URL.
/// Hooks pointing anywhere else belong to other services.
fn validator_for_url(root_url: &str, url: &str) -> Option<ValidatorKind> {
    let rest = url.strip_prefix(root_url)?.strip_prefix("/validate/")?;
    rest.split('/').next()?.parse().ok()
}
