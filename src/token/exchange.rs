//! Token endpoint grants and the identity lookup that follows a code exchange.

use crate::config::ClientCredentials;
use crate::credentials::Identity;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Lifetime assumed when the provider reports neither `expires_on` nor `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// The provider reports numeric fields either as JSON numbers or numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    Text(String),
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// The token endpoint answered with a non-2xx status (e.g. `invalid_grant`).
#[derive(Debug, Error)]
#[error("Token endpoint returned status {status}: {body}")]
pub(crate) struct TokenRejected {
    pub status: u16,
    pub body: String,
}

/// Token endpoint response (authorization_code and refresh_token grants)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    expires_in: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    expires_on: Option<i64>,
}

/// Tokens granted by one call to the token endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_on: i64,
}

impl TokenResponse {
    fn into_grant(self, now: i64) -> Result<TokenGrant> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("Token response is missing access_token"))?;

        let expires_on = match (self.expires_on, self.expires_in) {
            (Some(on), _) => on,
            (None, Some(secs)) => now + secs,
            (None, None) => now + DEFAULT_LIFETIME_SECS,
        };

        Ok(TokenGrant {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires_on,
        })
    }
}

/// POSTs a form-encoded grant and parses the token response.
async fn request_token(
    http: &reqwest::Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<TokenGrant> {
    let response = http
        .post(token_url)
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await
        .context("Failed to send token request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(TokenRejected {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .context("Failed to parse token response")?;

    tracing::debug!(
        has_refresh_token = token_response.refresh_token.is_some(),
        expires_in = ?token_response.expires_in,
        expires_on = ?token_response.expires_on,
        "Token endpoint responded"
    );

    token_response.into_grant(Utc::now().timestamp())
}

/// Exchanges an authorization code for tokens (`grant_type=authorization_code`).
pub(crate) async fn exchange_code_for_token(
    http: &reqwest::Client,
    token_url: &str,
    credentials: &ClientCredentials,
    code: &str,
    resource: &str,
) -> Result<TokenGrant> {
    tracing::debug!(token_url = %token_url, "Exchanging authorization code");

    request_token(
        http,
        token_url,
        &[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("redirect_uri", credentials.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("resource", resource),
        ],
    )
    .await
}

/// Redeems a refresh token (`grant_type=refresh_token`).
pub(crate) async fn refresh_access_token(
    http: &reqwest::Client,
    token_url: &str,
    credentials: &ClientCredentials,
    refresh_token: &str,
    scope: &str,
) -> Result<TokenGrant> {
    tracing::debug!(token_url = %token_url, "Redeeming refresh token");

    request_token(
        http,
        token_url,
        &[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("redirect_uri", credentials.redirect_uri.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope),
        ],
    )
    .await
}

/// `GET /me` with a freshly issued access token.
pub(crate) async fn fetch_identity(
    http: &reqwest::Client,
    graph_base_url: &str,
    access_token: &str,
) -> Result<Identity> {
    let url = format!("{}/me", graph_base_url);
    let response = http
        .get(&url)
        .bearer_auth(access_token)
        .header("Accept", "application/json")
        .send()
        .await
        .context("Failed to send identity request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Identity lookup returned status {}: {}", status, body));
    }

    response
        .json::<Identity>()
        .await
        .context("Failed to parse identity response")
}
