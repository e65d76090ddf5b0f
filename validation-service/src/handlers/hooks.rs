use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use super::validate::supported_validator;
use crate::middleware::AuthenticatedUser;
use crate::models::{HookRegistration, RepoPath, RepositoryHooks};
use crate::startup::AppState;

fn repo_path(owner: String, repo: String) -> Result<RepoPath, AppError> {
    RepoPath::new(owner, repo).map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))
}

/// Every repository the session user can see, with its hook states.
pub async fn list_repositories(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<RepositoryHooks>>, AppError> {
    let repositories = state.hooks.repositories(&user.credential).await?;
    Ok(Json(repositories))
}

pub async fn list_hooks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<Vec<HookRegistration>>, AppError> {
    let repo = repo_path(owner, repo)?;
    let hooks = state.hooks.hooks(&repo, &user.credential).await?;
    Ok(Json(hooks))
}

pub async fn enable_hook(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((owner, repo, validator)): Path<(String, String, String)>,
) -> Result<(StatusCode, Json<HookRegistration>), AppError> {
    let validator = supported_validator(&state, &validator)?;
    let repo = repo_path(owner, repo)?;
    let registration = state.hooks.enable(&repo, validator, &user.credential).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

pub async fn disable_hook(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((owner, repo, hook_id)): Path<(String, String, i64)>,
) -> Result<StatusCode, AppError> {
    let repo = repo_path(owner, repo)?;
    state.hooks.disable(&repo, hook_id, &user.credential).await?;
    Ok(StatusCode::NO_CONTENT)
}
