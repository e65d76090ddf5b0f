use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use super::validate::supported_validator;
use crate::models::{Badge, RepoPath};
use crate::services::badges;
use crate::startup::AppState;

fn svg_response(status: StatusCode, body: Vec<u8>) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        body,
    )
        .into_response()
}

fn unavailable(status: StatusCode) -> Response {
    svg_response(status, badges::svg(Badge::Unavailable).as_bytes().to_vec())
}

/// Badge of the latest completed validation.
pub async fn status(
    State(state): State<AppState>,
    Path((validator, owner, repo)): Path<(String, String, String)>,
) -> Response {
    let Ok(validator) = supported_validator(&state, &validator) else {
        return unavailable(StatusCode::NOT_FOUND);
    };
    let Ok(repo) = RepoPath::new(owner, repo) else {
        return unavailable(StatusCode::NOT_FOUND);
    };

    match state.results.latest_badge(validator, &repo).await {
        Ok(Some(svg)) => svg_response(StatusCode::OK, svg),
        Ok(None) => unavailable(StatusCode::OK),
        Err(e) => {
            tracing::error!(repository = %repo, validator = %validator, error = %e, "Failed to read badge");
            unavailable(StatusCode::OK)
        }
    }
}
