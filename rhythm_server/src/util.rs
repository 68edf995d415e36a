use std::{future::Future, result::Result};

use axum::http::{header, HeaderMap};

use rhythm_core::{social::SessionUser, Error as RhythmError};
use rhythm_feed::RemoteBackend;

use crate::{error::ServerError, state::AppState};

pub const DEFAULT_TIMEOUT_MS: u64 = 30000;

pub fn timeout<T, E: Into<ServerError>>(
    f: impl Future<Output = Result<T, E>>,
) -> impl Future<Output = Result<T, ServerError>> {
    use futures::FutureExt;
    tokio::time::timeout(std::time::Duration::from_millis(DEFAULT_TIMEOUT_MS), f).map(move |result| {
        result
            .map(|r| r.map_err(Into::into))
            .unwrap_or_else(|_| Err(RhythmError::Timeout(format!("after {} ms", DEFAULT_TIMEOUT_MS)).into()))
    })
}

/// `Authorization: Bearer <token>`, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The caller's backend and user. `None` for anonymous requests.
pub async fn session(app_state: &AppState, headers: &HeaderMap) -> Result<Option<(RemoteBackend, SessionUser)>, ServerError> {
    let Some(token) = bearer_token(headers) else {
        return Ok(None);
    };
    let backend = app_state.backend.for_user(token)?;
    let user = timeout(backend.session_user()).await?;
    Ok(Some((backend, user)))
}

/// Like [`session`], but anonymous requests fail with `NotLoggedIn`.
pub async fn require_session(app_state: &AppState, headers: &HeaderMap) -> Result<(RemoteBackend, SessionUser), ServerError> {
    session(app_state, headers)
        .await?
        .ok_or_else(|| RhythmError::NotLoggedIn("missing bearer token".to_string()).into())
}
