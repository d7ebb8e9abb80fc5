//! Identity provider endpoints and authorization URL construction.

use crate::config::MicrosoftConfig;

/// Endpoint URLs derived from the authority host and tenant.
#[derive(Clone, Debug)]
pub struct ProviderEndpoints {
    /// `{authority}/{tenant}/oauth2/v2.0/authorize`
    pub authorize_url: String,
    /// `{authority}/{tenant}/oauth2/token`
    pub token_url: String,
    /// REST base for resource calls, no trailing slash
    pub graph_base_url: String,
    /// `resource` field of the authorization-code grant
    pub resource: String,
    /// `scope` field of the refresh-token grant
    pub refresh_scope: String,
}

impl ProviderEndpoints {
    pub fn from_config(config: &MicrosoftConfig) -> Self {
        let authority = config.authority.trim_end_matches('/');
        Self {
            authorize_url: format!("{}/{}/oauth2/v2.0/authorize", authority, config.tenant_id),
            token_url: format!("{}/{}/oauth2/token", authority, config.tenant_id),
            graph_base_url: config.graph_base_url.trim_end_matches('/').to_string(),
            resource: config.resource.clone(),
            refresh_scope: config.refresh_scope.clone(),
        }
    }
}

/// Outbound redirect description. Built per connect, discarded after redirect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub scopes: Vec<String>,
    pub consent_prompt: bool,
}

impl AuthorizationRequest {
    pub fn new<I, S>(scopes: I, consent_prompt: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            consent_prompt,
        }
    }

    pub fn from_config(config: &MicrosoftConfig) -> Self {
        Self::new(config.scopes.iter().cloned(), config.consent_prompt)
    }
}

/// Builds the provider authorization URL. Pure string construction.
pub fn build_authorize_url(
    authorize_url: &str,
    client_id: &str,
    redirect_uri: &str,
    request: &AuthorizationRequest,
    state: &str,
) -> String {
    let scopes = request.scopes.join(" ");
    let mut url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&response_mode=query&scope={}&state={}",
        authorize_url,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes),
        urlencoding::encode(state)
    );
    if request.consent_prompt {
        url.push_str("&prompt=consent");
    }
    url
}
