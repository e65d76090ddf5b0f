//! Session cookie extractor for the hook management routes.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::models::AccessCredential;
use crate::startup::AppState;

/// The logged-in user and the credential their session resolves to.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub credential: AccessCredential,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let session_id = jar
            .get(&state.config.settings.cookie_name)
            .map(|c| c.value().to_string())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not logged in")))?;

        let credential = state
            .credentials
            .lookup_by_session(&session_id)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    AppError::Unauthorized(anyhow::anyhow!("Unknown session"))
                } else {
                    AppError::from(e)
                }
            })?;

        tracing::debug!(username = %credential.username, "Resolved session");

        Ok(Self { credential })
    }
}
