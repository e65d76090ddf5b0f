use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use service_core::error::AppError;

use crate::dtos::{LoginRequest, SessionResponse};
use crate::models::Session;
use crate::startup::AppState;

/// Exchange host credentials for a token, store it and open a session.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let username = request.username.trim().to_string();
    if username.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Username is required")));
    }

    let credential = state
        .remote
        .issue_token(&username, &request.password)
        .await?;
    state.credentials.save_credential(&credential).await?;

    let ttl_days = state.config.settings.session_ttl_days;
    let session = Session::generate(&credential.username, ttl_days);
    state.credentials.link_session(&session).await?;

    tracing::info!(username = %session.username, "User logged in");

    let cookie = Cookie::build((state.config.settings.cookie_name.clone(), session.id))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::days(ttl_days))
        .build();

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            username: session.username,
            expires_at: session.expires_at,
        }),
    ))
}

/// Drop the session link and clear the cookie. Unknown sessions are ignored.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), AppError> {
    let name = state.config.settings.cookie_name.clone();
    if let Some(cookie) = jar.get(&name) {
        state.credentials.unlink_session(cookie.value()).await?;
        tracing::info!("User logged out");
    }

    Ok((
        jar.remove(Cookie::build((name, "")).path("/")),
        StatusCode::NO_CONTENT,
    ))
}
