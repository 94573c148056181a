//! Login endpoints and the bearer token extractor.

use super::AppState;
use crate::core::auth::{self, Session};
use crate::errors::{Error, Result};
use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
};
use serde::{Deserialize, Serialize};

impl FromRequestParts<AppState> for Session {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(Error::Unauthorized)?;

        auth::authenticate(&state.db, token).await
    }
}

/// Body of `POST /auth/login-code`.
#[derive(Debug, Deserialize)]
pub struct LoginCodeRequest {
    /// Address to send the code to
    pub email: String,
}

/// Body of `POST /auth/session`.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    /// Address the code was sent to
    pub email: String,
    /// The emailed six digit code
    pub code: String,
}

/// A new session together with its token, which [`Session`] never serializes.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Bearer token for later requests
    pub token: String,
    /// Who the token belongs to
    #[serde(flatten)]
    pub session: Session,
}

/// Emails a login code. Always `202` on success, whatever the role.
pub async fn request_code(
    State(state): State<AppState>,
    Json(request): Json<LoginCodeRequest>,
) -> Result<StatusCode> {
    auth::request_login_code(
        &state.db,
        state.mailer.as_ref(),
        &state.config.auth,
        &request.email,
    )
    .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Trades an emailed code for a session.
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<SessionResponse>> {
    let session =
        auth::verify_login_code(&state.db, &state.config.auth, &request.email, &request.code)
            .await?;
    Ok(Json(SessionResponse {
        token: session.token.clone(),
        session,
    }))
}

/// Logs out.
pub async fn delete_session(State(state): State<AppState>, session: Session) -> Result<StatusCode> {
    auth::logout(&state.db, &session.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the caller's session without its token.
pub async fn me(session: Session) -> Json<Session> {
    Json(session)
}
