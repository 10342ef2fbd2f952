//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for signup, login, logout, and the current auth state.
//! Each browser gets its own `SessionManager`, bound by the `session` cookie issued on
//! login or signup.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use vidshare_core::{ApplicationUser, AuthState, Role, SessionError, SignupData, SignupOutcome};

use crate::web::{
    sessions::{cleared_session_cookie, session_cookie, session_id},
    state::AppState,
};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// One of `viewer`, `creator`, `admin`. Defaults to `creator`.
    pub role: Option<String>,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub role: String,
    pub is_verified: bool,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

impl From<ApplicationUser> for UserResponse {
    fn from(user: ApplicationUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            name: user.name,
            role: user.role.to_string(),
            is_verified: user.is_verified,
            avatar_url: user.avatar_url,
            bio: user.bio,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SignupResponse {
    pub success: bool,
    pub message: String,
    pub user: Option<UserResponse>,
}

impl From<SignupOutcome> for SignupResponse {
    fn from(outcome: SignupOutcome) -> Self {
        Self {
            success: outcome.success,
            message: outcome.message,
            user: outcome.user.map(UserResponse::from),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AuthStateResponse {
    pub loading: bool,
    pub user: Option<UserResponse>,
}

impl From<AuthState> for AuthStateResponse {
    fn from(state: AuthState) -> Self {
        Self {
            loading: state.loading,
            user: state.current_user.map(UserResponse::from),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    /// False when the hosted service is not configured.
    pub available: bool,
    pub loading: bool,
    pub authenticated: bool,
}

fn session_error_response(e: SessionError) -> (StatusCode, String) {
    let status = match e {
        SessionError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Authentication(_) => StatusCode::UNAUTHORIZED,
        SessionError::Remote(_) => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

fn no_session() -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, "No session found".to_string())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /auth/status - Whether auth is available and the caller is signed in
#[utoipa::path(
    get,
    path = "/auth/status",
    responses(
        (status = 200, description = "Current auth status", body = StatusResponse)
    )
)]
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<StatusResponse> {
    let auth = match state.sessions.lookup(&headers).await {
        Some(session) => session.state(),
        None => AuthState {
            loading: false,
            current_user: None,
        },
    };
    Json(StatusResponse {
        available: state.sessions.is_available(),
        loading: auth.loading,
        authenticated: auth.current_user.is_some(),
    })
}

/// POST /auth/login - Sign in with email and password
///
/// Issues a session cookie unless the caller already has one. The signed-in user becomes
/// available on `/me` once the session change is processed.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 204, description = "Credentials accepted"),
        (status = 401, description = "Invalid credentials"),
        (status = 503, description = "Authentication service unavailable")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Response, (StatusCode, String)> {
    if let Some(session) = state.sessions.lookup(&headers).await {
        session
            .login(&req.email, &req.password)
            .await
            .map_err(session_error_response)?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let session = state.sessions.open().await;
    if let Err(e) = session.login(&req.email, &req.password).await {
        session.stop().await;
        return Err(session_error_response(e));
    }
    let id = state.sessions.insert(session).await;

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, session_cookie(&id))],
    )
        .into_response())
}

/// POST /auth/signup - Create a new account and its profile
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = SignupResponse),
        (status = 400, description = "Signup failed", body = SignupResponse)
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SignupRequest>,
) -> Result<Response, (StatusCode, String)> {
    let role = req
        .role
        .as_deref()
        .map(str::parse::<Role>)
        .transpose()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
        .unwrap_or_default();

    let data = SignupData {
        email: req.email,
        password: req.password,
        first_name: req.first_name,
        last_name: req.last_name,
        role,
    };

    if let Some(session) = state.sessions.lookup(&headers).await {
        let outcome = session.signup(&data).await;
        return Ok(signup_response(outcome, None));
    }

    let session = state.sessions.open().await;
    let outcome = session.signup(&data).await;
    if !outcome.success {
        session.stop().await;
        return Ok(signup_response(outcome, None));
    }
    let id = state.sessions.insert(session).await;

    Ok(signup_response(outcome, Some(session_cookie(&id))))
}

fn signup_response(outcome: SignupOutcome, cookie: Option<String>) -> Response {
    let status = if outcome.success {
        StatusCode::CREATED
    } else {
        StatusCode::BAD_REQUEST
    };
    let body = Json(SignupResponse::from(outcome));
    match cookie {
        Some(cookie) => (status, [(header::SET_COOKIE, cookie)], body).into_response(),
        None => (status, body).into_response(),
    }
}

/// POST /auth/logout - Sign out and end the caller's session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Signed out"),
        (status = 401, description = "No active session"),
        (status = 502, description = "Remote sign-out failed"),
        (status = 503, description = "Authentication service unavailable")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let id = session_id(&headers).ok_or_else(no_session)?;
    let session = state.sessions.get(id).await.ok_or_else(no_session)?;

    session.logout().await.map_err(session_error_response)?;
    state.sessions.close(id).await;

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, cleared_session_cookie())],
    ))
}

/// POST /auth/refresh - Re-check the remote session and return the resulting state
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Reconciled auth state", body = AuthStateResponse),
        (status = 401, description = "No active session")
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AuthStateResponse>, (StatusCode, String)> {
    let session = state.sessions.lookup(&headers).await.ok_or_else(no_session)?;
    Ok(Json(AuthStateResponse::from(session.refresh().await)))
}

/// GET /me - The signed-in user
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "The current user", body = UserResponse),
        (status = 401, description = "Nobody is signed in")
    )
)]
pub async fn me_handler(Extension(user): Extension<ApplicationUser>) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}
