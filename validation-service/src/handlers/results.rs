use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use super::validate::supported_validator;
use crate::dtos::{HistoryResponse, ResultsView};
use crate::models::RepoPath;
use crate::startup::AppState;

pub async fn latest_results(
    State(state): State<AppState>,
    Path((validator, owner, repo)): Path<(String, String, String)>,
) -> Result<Json<ResultsView>, AppError> {
    render(&state, &validator, owner, repo, None).await
}

pub async fn revision_results(
    State(state): State<AppState>,
    Path((validator, owner, repo, revision)): Path<(String, String, String, String)>,
) -> Result<Json<ResultsView>, AppError> {
    render(&state, &validator, owner, repo, Some(revision)).await
}

async fn render(
    state: &AppState,
    validator: &str,
    owner: String,
    repo: String,
    revision: Option<String>,
) -> Result<Json<ResultsView>, AppError> {
    let validator = supported_validator(state, validator)?;
    let repo = RepoPath::new(owner, repo).map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let stored = state
        .results
        .read(validator, &repo, revision.as_deref())
        .await?;
    let history = state.results.history(validator, &repo).await?;

    Ok(Json(ResultsView::new(
        validator,
        repo.to_string(),
        stored,
        history,
    )))
}

pub async fn history(
    State(state): State<AppState>,
    Path((validator, owner, repo)): Path<(String, String, String)>,
) -> Result<Json<HistoryResponse>, AppError> {
    let validator = supported_validator(&state, &validator)?;
    let repo = RepoPath::new(owner, repo).map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let history = state.results.history(validator, &repo).await?;
    Ok(Json(HistoryResponse {
        validator,
        repository: repo.to_string(),
        history,
    }))
}
