//! Browser-facing endpoints of the authorization code flow.
//!
//! 1. `GET /microsoft/connect` issues a CSRF state and redirects (302) to the provider
//! 2. User signs in and consents on the provider's site
//! 3. Provider redirects to `GET /microsoft/callback`
//! 4. State is consumed, the code exchanged and the sealed bundle stored
//! 5. Browser is redirected (302) to `redirect_after_callback`
//!
//! `POST /microsoft/disconnect` forgets the stored bundle.

mod state;

pub use state::{run_state_cleanup, PendingAuthorization, StateManager};

use crate::auth::session_key;
use crate::config::BridgeConfig;
use crate::error::GraphError;
use crate::token::{AuthorizationCallback, AuthorizationRequest, TokenManager};
use axum::{
    extract::{Query, State},
    http::{header::LOCATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_description: Option<String>,
}

/// Application error types for OAuth endpoints
enum AppError {
    /// Provider reported an error on the callback
    Denied { error: String, description: String },
    BadRequest(String),
    Unauthorized(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, error_description) = match self {
            AppError::Denied { error, description } => {
                (StatusCode::BAD_REQUEST, error, Some(description))
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg, None),
        };

        let body = Json(ErrorResponse {
            error,
            error_description,
        });

        (status, body).into_response()
    }
}

impl From<GraphError> for AppError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::AuthorizationDenied { error, description } => {
                AppError::Denied { error, description }
            }
            GraphError::TokenExchange(_) | GraphError::TokenRefresh(_) | GraphError::RemoteCall { .. } => {
                AppError::BadGateway(err.to_string())
            }
            GraphError::MissingSession(_) | GraphError::CorruptSession(_) => {
                AppError::Unauthorized(err.to_string())
            }
            GraphError::UnexpectedResponse { .. } => AppError::BadGateway(err.to_string()),
            GraphError::Config(_) | GraphError::Store(_) => AppError::ServerError(err.to_string()),
        }
    }
}

/// Shared application state for the OAuth endpoints
#[derive(Clone)]
pub struct OAuthAppState {
    pub tokens: Arc<TokenManager>,
    pub state_manager: StateManager,
    pub auth_enabled: bool,
    pub authorization: AuthorizationRequest,
    pub redirect_after_callback: String,
}

impl OAuthAppState {
    pub fn from_config(tokens: Arc<TokenManager>, config: &BridgeConfig) -> Self {
        Self {
            tokens,
            state_manager: StateManager::new(config.session.state_expiry_seconds),
            auth_enabled: config.server.auth_enabled,
            authorization: AuthorizationRequest::from_config(&config.microsoft),
            redirect_after_callback: config.microsoft.redirect_after_callback.clone(),
        }
    }
}

/// Create OAuth API router
pub fn create_oauth_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/microsoft/connect", get(connect))
        .route("/microsoft/callback", get(callback))
        .route("/microsoft/disconnect", post(disconnect))
        .with_state(Arc::new(state))
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// GET /microsoft/connect
///
/// Redirects to the provider's authorization page.
async fn connect(
    State(state): State<Arc<OAuthAppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let session = session_key(&headers, state.auth_enabled)
        .map_err(|e| AppError::Unauthorized(format!("Invalid session key: {}", e)))?;

    let csrf_state = state.state_manager.issue(&session);
    let url = state.tokens.begin_authorization(&state.authorization, &csrf_state);

    info!(
        session = %session,
        scopes = %state.authorization.scopes.join(" "),
        "Redirecting to identity provider"
    );

    Ok(found(&url))
}

/// GET /microsoft/callback
///
/// # Security
/// - `state` must have been issued by `connect` and not yet consumed
/// - The session is taken from the state, never from the query
async fn callback(
    State(state): State<Arc<OAuthAppState>>,
    Query(callback): Query<AuthorizationCallback>,
) -> Result<Response, AppError> {
    debug!(has_code = callback.code.is_some(), "Authorization callback received");

    if callback.is_error() {
        let session = callback
            .state
            .as_deref()
            .and_then(|s| state.state_manager.consume(s))
            .map(|pending| pending.session);

        return Err(state.tokens.deny_authorization(session.as_deref(), &callback).into());
    }

    let csrf_state = callback
        .state
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let pending = state.state_manager.consume(csrf_state).ok_or_else(|| {
        warn!(state = %csrf_state, "Invalid or expired OAuth state");
        AppError::Unauthorized("Invalid or expired OAuth state".to_string())
    })?;

    let missing_code = callback.code.as_deref().map_or(true, str::is_empty);

    let bundle = state
        .tokens
        .complete_authorization(&pending.session, &callback)
        .await
        .map_err(|e| {
            error!(session = %pending.session, error = %e, "Authorization could not be completed");
            if missing_code {
                AppError::BadRequest("Missing 'code' parameter".to_string())
            } else {
                AppError::from(e)
            }
        })?;

    info!(
        session = %pending.session,
        user = %bundle.user.id,
        redirect = %state.redirect_after_callback,
        "Authorization completed, redirecting"
    );

    Ok(found(&state.redirect_after_callback))
}

/// POST /microsoft/disconnect
async fn disconnect(
    State(state): State<Arc<OAuthAppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let session = session_key(&headers, state.auth_enabled)
        .map_err(|e| AppError::Unauthorized(format!("Invalid session key: {}", e)))?;

    state.tokens.forget(&session)?;
    Ok(StatusCode::NO_CONTENT)
}
