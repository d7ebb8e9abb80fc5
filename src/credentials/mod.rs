//! Token bundle model and its sealed (encrypted) form.
//!
//! A [`TokenBundle`] only ever leaves process memory as a [`SealedPayload`]:
//!
//! ```text
//! ┌──────────────────────────┐   Sealer::seal   ┌──────────────────────────┐
//! │ TokenBundle (plaintext)  │ ───────────────▶ │ SealedPayload (base64)   │
//! │ one request/refresh only │ ◀─────────────── │ session store, listeners │
//! └──────────────────────────┘   Sealer::open   └──────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use graph_bridge::credentials::{Identity, Sealer, TokenBundle};
//!
//! # fn main() -> anyhow::Result<()> {
//! let sealer = Sealer::from_base64(&std::env::var("GRAPH_BRIDGE_ENCRYPTION_KEY")?)?;
//!
//! let bundle = TokenBundle {
//!     access_token: "eyJ0eXAi...".to_string(),
//!     refresh_token: "0.AAAA...".to_string(),
//!     expires_on: 1_735_689_600,
//!     user: Identity::default(),
//! };
//!
//! let sealed = sealer.seal(&bundle)?;
//! let restored: TokenBundle = sealer.open(&sealed)?;
//! assert_eq!(restored, bundle);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

mod encryption;

pub use encryption::{open, seal, validate_key};

/// Snapshot of the signed-in account, as returned by `GET /me`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
}

/// Access/refresh token pair plus expiry and identity.
///
/// `expires_on` is epoch seconds. The bundle counts as expired once
/// `expires_on <= now`; there is no grace window.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_on: i64,
    pub user: Identity,
}

impl TokenBundle {
    pub fn is_expired_at(&self, now_epoch: i64) -> bool {
        self.expires_on <= now_epoch
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    /// False when the provider issued no refresh token (`offline_access`
    /// not granted); such a bundle cannot outlive its access token.
    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Checks the fields every stored bundle must carry.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.access_token.is_empty() {
            return Err("access_token is empty".to_string());
        }
        if self.expires_on <= 0 {
            return Err(format!("invalid expires_on {}", self.expires_on));
        }
        Ok(())
    }
}

impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .field("user", &self.user)
            .finish()
    }
}

/// Error details reported by the provider on the authorization callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub error_description: String,
}

/// Opaque encrypted value. The only form handed to stores and listeners.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedPayload(String);

impl SealedPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }

    /// Wraps bytes read back from a session store.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let text = String::from_utf8(bytes).context("Sealed payload is not valid UTF-8")?;
        Ok(Self(text))
    }
}

impl fmt::Debug for SealedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedPayload({} bytes)", self.0.len())
    }
}

/// Holds the master key and seals/opens serde values.
#[derive(Clone)]
pub struct Sealer {
    key: Vec<u8>,
}

impl Sealer {
    /// Builds a sealer from a base64-encoded 32-byte key.
    pub fn from_base64(key_base64: &str) -> Result<Self> {
        let key = validate_key(key_base64)?;
        Ok(Self { key })
    }

    pub fn from_key(key: [u8; 32]) -> Self {
        Self { key: key.to_vec() }
    }

    pub fn seal<T: Serialize>(&self, value: &T) -> Result<SealedPayload> {
        let plaintext = serde_json::to_vec(value).context("Failed to serialize payload")?;
        Ok(SealedPayload(seal(&plaintext, &self.key)?))
    }

    pub fn open<T: DeserializeOwned>(&self, sealed: &SealedPayload) -> Result<T> {
        let plaintext = open(&sealed.0, &self.key)?;
        serde_json::from_slice(&plaintext).context("Decrypted payload has unexpected shape")
    }
}

impl fmt::Debug for Sealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sealer(<key>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> TokenBundle {
        TokenBundle {
            access_token: "access-123".to_string(),
            refresh_token: "refresh-456".to_string(),
            expires_on: 1_900_000_000,
            user: Identity {
                id: "87d349ed-44d7-43e1-9a83-5f2406dee5bd".to_string(),
                display_name: Some("Megan Bowen".to_string()),
                mail: Some("MeganB@contoso.com".to_string()),
                user_principal_name: Some("MeganB@contoso.com".to_string()),
                ..Identity::default()
            },
        }
    }

    #[test]
    fn test_bundle_seal_open_is_identical() {
        let sealer = Sealer::from_key([3u8; 32]);
        let original = bundle();

        let sealed = sealer.seal(&original).unwrap();
        assert!(!sealed.as_str().contains("access-123"));

        let restored: TokenBundle = sealer.open(&sealed).unwrap();
        assert_eq!(restored, original);
        assert_eq!(
            serde_json::to_vec(&restored).unwrap(),
            serde_json::to_vec(&original).unwrap()
        );
    }

    #[test]
    fn test_sealed_payload_bytes_roundtrip() {
        let sealer = Sealer::from_key([3u8; 32]);
        let sealed = sealer.seal(&bundle()).unwrap();

        let restored = SealedPayload::from_bytes(sealed.clone().into_bytes()).unwrap();
        assert_eq!(restored, sealed);
        assert!(SealedPayload::from_bytes(vec![0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_open_with_other_key_fails() {
        let sealed = Sealer::from_key([3u8; 32]).seal(&bundle()).unwrap();
        let result: Result<TokenBundle> = Sealer::from_key([4u8; 32]).open(&sealed);
        assert!(result.is_err());
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let b = bundle();
        assert!(b.is_expired_at(b.expires_on));
        assert!(b.is_expired_at(b.expires_on + 1));
        assert!(!b.is_expired_at(b.expires_on - 1));
    }

    #[test]
    fn test_validate_requires_access_token() {
        let mut b = bundle();
        assert!(b.validate().is_ok());

        b.refresh_token.clear();
        assert!(b.validate().is_ok());
        assert!(!b.can_refresh());

        b.access_token.clear();
        assert!(b.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", bundle());
        assert!(!rendered.contains("access-123"));
        assert!(!rendered.contains("refresh-456"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_identity_from_graph_me() {
        let json = r#"{
            "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#users/$entity",
            "id": "48d31887-5fad-4d73-a9f5-3c356e68a038",
            "displayName": "Megan Bowen",
            "givenName": "Megan",
            "surname": "Bowen",
            "mail": "MeganB@contoso.com",
            "userPrincipalName": "MeganB@contoso.com",
            "jobTitle": "Auditor",
            "businessPhones": ["+1 412 555 0109"]
        }"#;

        let identity: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(identity.id, "48d31887-5fad-4d73-a9f5-3c356e68a038");
        assert_eq!(identity.given_name.as_deref(), Some("Megan"));
        assert_eq!(identity.job_title.as_deref(), Some("Auditor"));
    }
}
