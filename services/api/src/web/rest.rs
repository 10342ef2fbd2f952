//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification, and the router that
//! wires the auth handlers to the shared `AppState`.

use crate::web::{
    auth::{
        self, AuthStateResponse, LoginRequest, SignupRequest, SignupResponse, StatusResponse,
        UserResponse,
    },
    middleware::require_auth,
    state::AppState,
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::status_handler,
        auth::login_handler,
        auth::signup_handler,
        auth::logout_handler,
        auth::refresh_handler,
        auth::me_handler,
    ),
    components(
        schemas(
            LoginRequest,
            SignupRequest,
            SignupResponse,
            UserResponse,
            AuthStateResponse,
            StatusResponse
        )
    ),
    tags(
        (name = "vidshare API", description = "Session and profile endpoints for the video-sharing app.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Router
//=========================================================================================

/// Builds the full application router, including CORS and the Swagger UI.
pub fn app_router(app_state: Arc<AppState>) -> Router {
    let mut cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);
    match app_state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(e) => warn!(
            "Ignoring invalid CORS origin '{}': {}",
            app_state.config.cors_origin, e
        ),
    }

    // Public routes (no signed-in user required)
    let public_routes = Router::new()
        .route("/auth/status", get(auth::status_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/refresh", post(auth::refresh_handler));

    // Protected routes
    let protected_routes = Router::new()
        .route("/me", get(auth::me_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
