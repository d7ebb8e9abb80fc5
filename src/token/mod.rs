//! OAuth 2.0 token lifecycle against the identity provider.
//!
//! Implements the authorization code flow and keeps access tokens fresh:
//! 1. `begin_authorization` builds the provider redirect URL
//! 2. User signs in and consents on the provider's site
//! 3. Provider redirects back with `code` (or `error`)
//! 4. `complete_authorization` exchanges the code, looks up `/me`, seals the
//!    bundle into the session store and announces `AuthOutcome::Succeeded`
//! 5. `get_valid_access_token` reads the sealed bundle back on every call and
//!    refreshes it once `expires_on <= now`
//!
//! The manager holds no token state between calls; everything round-trips
//! through the injected [`SessionStore`].

mod events;
mod exchange;
mod provider;

#[cfg(test)]
mod tests;

pub use events::AuthOutcome;
pub use provider::{build_authorize_url, AuthorizationRequest, ProviderEndpoints};

use crate::config::{BridgeConfig, ClientCredentials};
use crate::credentials::{ErrorPayload, SealedPayload, Sealer, TokenBundle};
use crate::error::GraphError;
use crate::session::SessionStore;
use chrono::Utc;
use dashmap::DashMap;
use events::OutcomeBus;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

/// Query parameters the provider appends to the callback URL
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct AuthorizationCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl AuthorizationCallback {
    /// Parses a raw query string (without the leading `?`).
    pub fn parse(query: &str) -> Result<Self, GraphError> {
        serde_urlencoded::from_str(query.trim_start_matches('?'))
            .map_err(|e| GraphError::TokenExchange(format!("Malformed callback query: {}", e)))
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Produces a currently valid access token for a session.
pub struct TokenManager {
    credentials: ClientCredentials,
    endpoints: ProviderEndpoints,
    store: Arc<dyn SessionStore>,
    sealer: Sealer,
    http: reqwest::Client,
    outcomes: OutcomeBus,
    /// One async mutex per session key currently refreshing
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TokenManager {
    pub fn new(
        credentials: ClientCredentials,
        endpoints: ProviderEndpoints,
        store: Arc<dyn SessionStore>,
        sealer: Sealer,
    ) -> Self {
        Self {
            credentials,
            endpoints,
            store,
            sealer,
            http: reqwest::Client::new(),
            outcomes: OutcomeBus::new(),
            refresh_locks: DashMap::new(),
        }
    }

    /// Builds a manager from configuration. Fails on a malformed encryption key.
    pub fn from_config(config: &BridgeConfig, store: Arc<dyn SessionStore>) -> Result<Self, GraphError> {
        let sealer = Sealer::from_base64(&config.session.encryption_key)
            .map_err(|e| GraphError::Config(format!("Invalid encryption key: {:#}", e)))?;

        Ok(Self::new(
            config.microsoft.client_credentials(),
            ProviderEndpoints::from_config(&config.microsoft),
            store,
            sealer,
        ))
    }

    /// Replaces the HTTP client used for token and identity requests
    /// (e.g. one configured with timeouts).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Listen for [`AuthOutcome`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthOutcome> {
        self.outcomes.subscribe()
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    pub fn sealer(&self) -> &Sealer {
        &self.sealer
    }

    /// Provider authorization URL for `request`, carrying `state` back to the callback.
    pub fn begin_authorization(&self, request: &AuthorizationRequest, state: &str) -> String {
        build_authorize_url(
            &self.endpoints.authorize_url,
            &self.credentials.client_id,
            &self.credentials.redirect_uri,
            request,
            state,
        )
    }

    /// Handles the provider callback for `session`.
    ///
    /// An `error` in the callback is published as [`AuthOutcome::Failed`] and
    /// returned as `AuthorizationDenied` without contacting the token endpoint.
    /// Every other failure is published as `token_exchange_failed`.
    pub async fn complete_authorization(
        &self,
        session: &str,
        callback: &AuthorizationCallback,
    ) -> Result<TokenBundle, GraphError> {
        if callback.is_error() {
            return Err(self.deny_authorization(Some(session), callback));
        }

        let result = match callback.code.as_deref().filter(|c| !c.is_empty()) {
            Some(code) => self.exchange(code).await,
            None => Err(GraphError::TokenExchange(
                "Callback carries neither 'code' nor 'error'".to_string(),
            )),
        };

        match result {
            Ok(bundle) => {
                self.save_and_announce(session, &bundle)?;
                info!(
                    session = %session,
                    user = %bundle.user.id,
                    expires_on = bundle.expires_on,
                    "Authorization completed"
                );
                Ok(bundle)
            }
            Err(e) => {
                error!(session = %session, error = %e, "Token exchange failed");
                self.report_failure(
                    Some(session),
                    &ErrorPayload {
                        error: "token_exchange_failed".to_string(),
                        error_description: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Publishes the provider's `error` from `callback` as [`AuthOutcome::Failed`]
    /// and returns it as `AuthorizationDenied`.
    ///
    /// `session` is `None` when the callback could not be tied to a session
    /// (unknown or expired state).
    pub fn deny_authorization(&self, session: Option<&str>, callback: &AuthorizationCallback) -> GraphError {
        let payload = ErrorPayload {
            error: callback.error.clone().unwrap_or_default(),
            error_description: callback.error_description.clone().unwrap_or_default(),
        };
        warn!(
            session = ?session,
            error = %payload.error,
            description = %payload.error_description,
            "Authorization denied by provider"
        );
        self.report_failure(session, &payload);

        GraphError::AuthorizationDenied {
            error: payload.error,
            description: payload.error_description,
        }
    }

    async fn exchange(&self, code: &str) -> Result<TokenBundle, GraphError> {
        let grant = exchange::exchange_code_for_token(
            &self.http,
            &self.endpoints.token_url,
            &self.credentials,
            code,
            &self.endpoints.resource,
        )
        .await
        .map_err(|e| GraphError::TokenExchange(format!("{:#}", e)))?;

        let refresh_token = grant.refresh_token.unwrap_or_else(|| {
            warn!("Provider issued no refresh_token, session will end when the access token expires");
            String::new()
        });

        let user = exchange::fetch_identity(&self.http, &self.endpoints.graph_base_url, &grant.access_token)
            .await
            .map_err(|e| GraphError::TokenExchange(format!("{:#}", e)))?;

        Ok(TokenBundle {
            access_token: grant.access_token,
            refresh_token,
            expires_on: grant.expires_on,
            user,
        })
    }

    /// Returns an access token for `session`, refreshing it first if expired.
    ///
    /// Refresh failures are returned as `TokenRefresh` and never retried.
    pub async fn get_valid_access_token(&self, session: &str) -> Result<String, GraphError> {
        let bundle = self.load_bundle(session)?;
        if !bundle.is_expired_at(Utc::now().timestamp()) {
            return Ok(bundle.access_token);
        }

        let lock = self
            .refresh_locks
            .entry(session.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;

            // A refresh may have completed while we waited for the lock.
            match self.load_bundle(session) {
                Ok(bundle) if bundle.is_expired_at(Utc::now().timestamp()) => {
                    self.refresh(session, bundle).await.map(|b| b.access_token)
                }
                Ok(bundle) => {
                    debug!(session = %session, "Reusing token refreshed by concurrent caller");
                    Ok(bundle.access_token)
                }
                Err(e) => Err(e),
            }
        };

        drop(lock);
        self.refresh_locks
            .remove_if(session, |_, l| Arc::strong_count(l) == 1);

        result
    }

    async fn refresh(&self, session: &str, bundle: TokenBundle) -> Result<TokenBundle, GraphError> {
        if !bundle.can_refresh() {
            warn!(session = %session, "Access token expired and no refresh token is stored");
            self.discard(session);
            return Err(GraphError::TokenRefresh("no refresh token".to_string()));
        }

        info!(session = %session, expires_on = bundle.expires_on, "Access token expired, refreshing");

        let grant = exchange::refresh_access_token(
            &self.http,
            &self.endpoints.token_url,
            &self.credentials,
            &bundle.refresh_token,
            &self.endpoints.refresh_scope,
        )
        .await
        .map_err(|e| {
            error!(session = %session, error = %format!("{:#}", e), "Token refresh failed");
            // A rejected refresh token stays rejected; transport failures keep the bundle.
            if e.downcast_ref::<exchange::TokenRejected>().is_some() {
                self.discard(session);
            }
            GraphError::TokenRefresh(format!("{:#}", e))
        })?;

        let refreshed = TokenBundle {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.unwrap_or(bundle.refresh_token),
            expires_on: grant.expires_on,
            user: bundle.user,
        };

        self.save_and_announce(session, &refreshed)?;
        info!(session = %session, expires_on = refreshed.expires_on, "Access token refreshed");

        Ok(refreshed)
    }

    /// Reads and opens the bundle for `session`.
    ///
    /// A bundle that cannot be opened or validated is removed from the store.
    pub fn load_bundle(&self, session: &str) -> Result<TokenBundle, GraphError> {
        let bytes = self
            .store
            .get(session)
            .map_err(GraphError::store)?
            .ok_or_else(|| GraphError::MissingSession(session.to_string()))?;

        match self.open_bundle(bytes) {
            Ok(bundle) => Ok(bundle),
            Err(reason) => {
                warn!(session = %session, reason = %reason, "Discarding unreadable session");
                self.discard(session);
                Err(GraphError::CorruptSession(reason))
            }
        }
    }

    /// Removes a bundle that can no longer produce a token. Store errors are logged.
    fn discard(&self, session: &str) {
        if let Err(e) = self.store.remove(session) {
            error!(session = %session, error = %format!("{:#}", e), "Failed to discard session");
        }
    }

    fn open_bundle(&self, bytes: Vec<u8>) -> Result<TokenBundle, String> {
        let sealed = SealedPayload::from_bytes(bytes).map_err(|e| format!("{:#}", e))?;
        let bundle: TokenBundle = self.sealer.open(&sealed).map_err(|e| format!("{:#}", e))?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Seals `bundle` into the store under `session`.
    pub fn save_bundle(&self, session: &str, bundle: &TokenBundle) -> Result<SealedPayload, GraphError> {
        let sealed = self
            .sealer
            .seal(bundle)
            .map_err(|e| GraphError::Store(format!("Failed to seal bundle: {:#}", e)))?;
        self.store
            .put(session, sealed.clone().into_bytes())
            .map_err(GraphError::store)?;
        Ok(sealed)
    }

    fn save_and_announce(&self, session: &str, bundle: &TokenBundle) -> Result<(), GraphError> {
        let sealed = self.save_bundle(session, bundle)?;
        self.outcomes.publish(AuthOutcome::Succeeded {
            session: session.to_string(),
            bundle: sealed,
        });
        Ok(())
    }

    /// Publishes a sealed [`ErrorPayload`] as [`AuthOutcome::Failed`].
    pub fn report_failure(&self, session: Option<&str>, payload: &ErrorPayload) {
        match self.sealer.seal(payload) {
            Ok(sealed) => self.outcomes.publish(AuthOutcome::Failed {
                session: session.map(str::to_string),
                error: sealed,
            }),
            Err(e) => error!(error = %format!("{:#}", e), "Failed to seal error payload"),
        }
    }

    /// Destroys the stored bundle (session invalidated / disconnect).
    pub fn forget(&self, session: &str) -> Result<(), GraphError> {
        self.store.remove(session).map_err(GraphError::store)?;
        info!(session = %session, "Session credentials removed");
        Ok(())
    }
}
