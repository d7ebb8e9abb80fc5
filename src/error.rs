//! Error taxonomy shared by the token lifecycle and the dispatcher.

use thiserror::Error;

/// Errors surfaced by graph-bridge operations.
///
/// Authorization-flow failures (`AuthorizationDenied`, `TokenExchange`) are
/// also published to listeners as [`crate::token::AuthOutcome::Failed`];
/// everything else is only returned to the caller of the failing operation.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The user or the provider declined consent.
    #[error("Authorization denied: {error} ({description})")]
    AuthorizationDenied { error: String, description: String },

    /// The authorization code could not be exchanged for tokens.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The refresh token was rejected. Terminal until re-authorization.
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// No token bundle stored for this session.
    #[error("No stored credentials for session '{0}'")]
    MissingSession(String),

    /// Stored bundle could not be decrypted or is incomplete.
    #[error("Stored credentials are unreadable: {0}")]
    CorruptSession(String),

    /// Transport failure (no status) or non-2xx response from a resource call.
    #[error("Remote call failed (status {}): {body}", status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()))]
    RemoteCall { status: Option<u16>, body: String },

    /// A 2xx response whose body does not fit the requested shape.
    #[error("Unexpected response (status {status}): {message}")]
    UnexpectedResponse { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Session store backend failure.
    #[error("Session store error: {0}")]
    Store(String),
}

impl GraphError {
    /// HTTP status of a failed remote call, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GraphError::RemoteCall { status, .. } => *status,
            GraphError::UnexpectedResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the caller has to send the user through authorization again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            GraphError::TokenRefresh(_)
                | GraphError::MissingSession(_)
                | GraphError::CorruptSession(_)
                | GraphError::AuthorizationDenied { .. }
        )
    }

    pub(crate) fn store(err: anyhow::Error) -> Self {
        GraphError::Store(format!("{:#}", err))
    }
}

impl From<reqwest::Error> for GraphError {
    fn from(err: reqwest::Error) -> Self {
        GraphError::RemoteCall {
            status: err.status().map(|s| s.as_u16()),
            body: err.to_string(),
        }
    }
}
