use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{PublicValidationRequest, ValidationAccepted};
use crate::models::{is_valid_revision, PushPayload, RepoPath, ValidatorKind};
use crate::services::SIGNATURE_HEADER;
use crate::startup::AppState;
use crate::workers::ValidationJob;

/// Accept a signed push notification and queue a validation run.
///
/// The in-progress result is published before responding; the run itself
/// happens on the worker pool.
pub async fn validate(
    State(state): State<AppState>,
    Path((validator, owner, repo)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ValidationAccepted>, AppError> {
    let validator = supported_validator(&state, &validator)?;
    let repo = RepoPath::new(owner, repo).map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    state.authenticator.verify(&body, signature)?;

    let payload: PushPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid push payload: {}", e)))?;
    tracing::info!(
        repository = %repo,
        validator = %validator,
        git_ref = payload.git_ref.as_deref().unwrap_or("-"),
        before = payload.before.as_deref().unwrap_or("-"),
        after = %payload.after,
        "Received push notification"
    );
    if !is_valid_revision(&payload.after) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid revision in push payload: {:?}",
            payload.after
        )));
    }

    let credential = state
        .credentials
        .lookup_by_repository(&repo)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                tracing::warn!(repository = %repo, "Push for repository without credential binding");
                AppError::Unauthorized(anyhow::anyhow!("No credential bound to {}", repo))
            } else {
                AppError::from(e)
            }
        })?;

    let slot = state.dispatcher.reserve()?;
    state
        .results
        .write_in_progress(validator, &repo, &payload.after)
        .await?;
    let handle = slot.submit(ValidationJob::new(
        validator,
        repo.clone(),
        payload.after.clone(),
        credential,
    ));

    Ok(Json(ValidationAccepted {
        status: "accepted".to_string(),
        job_id: handle.id,
        validator,
        repository: repo.to_string(),
        revision: payload.after,
    }))
}

/// Revision queued for one-shot validation of a public repository.
const PUBLIC_REVISION: &str = "HEAD";

/// Validate the current head of a public repository without a hook or binding.
///
/// The service account fetches the repository, so private repositories are
/// refused as if they did not exist.
pub async fn validate_public(
    State(state): State<AppState>,
    Json(request): Json<PublicValidationRequest>,
) -> Result<Json<ValidationAccepted>, AppError> {
    let Some(account) = state.config.settings.service_account.as_ref() else {
        tracing::warn!("Public validation requested but no service account is configured");
        return Err(AppError::ServiceUnavailable);
    };

    let validator = supported_validator(
        &state,
        request.validator.as_deref().unwrap_or(ValidatorKind::Bids.as_str()),
    )?;
    let repo = RepoPath::parse(request.repository.trim())
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let credential = state
        .remote
        .issue_token(&account.username, &account.password)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Service account could not obtain a token");
            AppError::BadGateway("Service account rejected by remote host".to_string())
        })?;

    let remote_repo = state.remote.get_repository(&repo, &credential).await?;
    if remote_repo.private {
        tracing::info!(repository = %repo, "Refusing public validation of private repository");
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Repository {} does not exist",
            repo
        )));
    }

    let slot = state.dispatcher.reserve()?;
    state
        .results
        .write_in_progress(validator, &repo, PUBLIC_REVISION)
        .await?;
    let handle = slot.submit(ValidationJob::new(
        validator,
        repo.clone(),
        PUBLIC_REVISION.to_string(),
        credential,
    ));
    tracing::info!(repository = %repo, validator = %validator, job_id = %handle.id, "Queued public validation");

    Ok(Json(ValidationAccepted {
        status: "accepted".to_string(),
        job_id: handle.id,
        validator,
        repository: repo.to_string(),
        revision: PUBLIC_REVISION.to_string(),
    }))
}

/// Parse a validator path segment, rejecting names this deployment does not run.
pub(crate) fn supported_validator(state: &AppState, name: &str) -> Result<ValidatorKind, AppError> {
    name.parse::<ValidatorKind>()
        .ok()
        .filter(|kind| state.registry.supports(*kind))
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unsupported validator: {}", name)))
}
