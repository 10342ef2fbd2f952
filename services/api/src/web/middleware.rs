//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::web::{sessions::session_id, state::AppState};

/// Middleware that resolves the caller's session cookie to its signed-in user.
///
/// If one is present, inserts the `ApplicationUser` into request extensions for handlers to use.
/// Otherwise (no cookie, unknown session, signed out, or the profile could not be resolved)
/// returns 401.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let id = session_id(req.headers()).map(str::to_string);
    let session = match id {
        Some(id) => state.sessions.get(&id).await,
        None => None,
    };
    let user = session
        .and_then(|session| session.current_user())
        .ok_or_else(|| {
            debug!("Rejected {} {}: no signed-in session", req.method(), req.uri().path());
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
