mod env;

use crate::credentials::validate_key;
use crate::error::GraphError;
use serde::Deserialize;

/// Complete graph-bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub microsoft: MicrosoftConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub onedrive: OneDriveConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

/// Application registration and provider endpoints
#[derive(Clone, Deserialize)]
pub struct MicrosoftConfig {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Callback URL registered with the provider
    #[serde(default)]
    pub redirect_uri: String,
    /// Where the browser goes after a successful callback
    #[serde(default = "default_redirect_after_callback")]
    pub redirect_after_callback: String,
    #[serde(default = "default_authority")]
    pub authority: String,
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    /// `resource` sent with the authorization-code grant
    #[serde(default = "default_resource")]
    pub resource: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_consent_prompt")]
    pub consent_prompt: bool,
    /// `scope` sent with the refresh-token grant
    #[serde(default = "default_refresh_scope")]
    pub refresh_scope: String,
}

fn default_redirect_after_callback() -> String {
    "/".to_string()
}

fn default_authority() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_resource() -> String {
    "https://graph.microsoft.com/".to_string()
}

fn default_scopes() -> Vec<String> {
    ["openid", "profile", "offline_access", "https://graph.microsoft.com/.default"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_consent_prompt() -> bool {
    true
}

fn default_refresh_scope() -> String {
    "openid profile offline_access".to_string()
}

impl Default for MicrosoftConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            redirect_after_callback: default_redirect_after_callback(),
            authority: default_authority(),
            graph_base_url: default_graph_base_url(),
            resource: default_resource(),
            scopes: default_scopes(),
            consent_prompt: default_consent_prompt(),
            refresh_scope: default_refresh_scope(),
        }
    }
}

impl MicrosoftConfig {
    pub fn client_credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
            tenant_id: self.tenant_id.clone(),
        }
    }
}

impl std::fmt::Debug for MicrosoftConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrosoftConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("redirect_after_callback", &self.redirect_after_callback)
            .field("authority", &self.authority)
            .field("graph_base_url", &self.graph_base_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Static client registration. Read-only for the process lifetime.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub tenant_id: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Which store holds sealed sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Memory,
    Sqlite,
}

/// Session storage and sealing
#[derive(Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_backend")]
    pub backend: SessionBackend,
    #[serde(default = "default_database")]
    pub database: String,
    /// Base64-encoded 32-byte key
    #[serde(default)]
    pub encryption_key: String,
    /// How long an OAuth `state` stays valid (seconds)
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,
}

fn default_backend() -> SessionBackend {
    SessionBackend::Memory
}

fn default_database() -> String {
    "sessions.db".to_string()
}

fn default_state_expiry() -> i64 {
    600
}

fn default_state_cleanup_interval() -> u64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database: default_database(),
            encryption_key: String::new(),
            state_expiry_seconds: default_state_expiry(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("backend", &self.backend)
            .field("database", &self.database)
            .field("encryption_key", &"<redacted>")
            .field("state_expiry_seconds", &self.state_expiry_seconds)
            .finish()
    }
}

/// HTTP server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Require `Authorization: Bearer <session-key>` on the OAuth routes
    #[serde(default)]
    pub auth_enabled: bool,
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            auth_enabled: false,
        }
    }
}

/// Mail transport registration
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_mail_enabled")]
    pub enabled: bool,
    /// Name the host registers the transport under
    #[serde(default = "default_transport_name")]
    pub transport: String,
}

fn default_mail_enabled() -> bool {
    true
}

fn default_transport_name() -> String {
    "microsoftgraph".to_string()
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: default_mail_enabled(),
            transport: default_transport_name(),
        }
    }
}

/// File storage adapter
#[derive(Debug, Clone, Deserialize)]
pub struct OneDriveConfig {
    /// Drive item the adapter is rooted at (e.g. `root` or `root:/Apps/mine`)
    #[serde(default = "default_onedrive_root")]
    pub root: String,
    /// Address items by path (`/root:/a/b`) rather than by id
    #[serde(default = "default_use_path")]
    pub use_path: bool,
}

fn default_onedrive_root() -> String {
    "root".to_string()
}

fn default_use_path() -> bool {
    true
}

impl Default for OneDriveConfig {
    fn default() -> Self {
        Self {
            root: default_onedrive_root(),
            use_path: default_use_path(),
        }
    }
}

/// Defaults for events built by the calendar wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub online_meeting: bool,
    #[serde(default = "default_body_content_type")]
    pub body_content_type: String,
}

fn default_body_content_type() -> String {
    "HTML".to_string()
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            online_meeting: false,
            body_content_type: default_body_content_type(),
        }
    }
}

impl BridgeConfig {
    /// Checks everything the token flow needs before the server starts.
    pub fn validate(&self) -> Result<(), GraphError> {
        let ms = &self.microsoft;
        let required = [
            ("microsoft.tenant_id (MS_TENANT_ID)", &ms.tenant_id),
            ("microsoft.client_id (MS_CLIENT_ID)", &ms.client_id),
            ("microsoft.client_secret (MS_CLIENT_SECRET)", &ms.client_secret),
            ("microsoft.redirect_uri (MS_REDIRECT_URL)", &ms.redirect_uri),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(GraphError::Config(format!("{} is required", name)));
            }
        }

        validate_key(&self.session.encryption_key).map_err(|e| {
            GraphError::Config(format!(
                "session.encryption_key (GRAPH_BRIDGE_ENCRYPTION_KEY): {:#}",
                e
            ))
        })?;

        if self.session.state_expiry_seconds <= 0 {
            return Err(GraphError::Config(
                "session.state_expiry_seconds must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlays recognised environment variables onto this config.
    pub fn apply_env(&mut self) {
        env::apply(self, |name| std::env::var(name).ok());
    }
}

/// Load configuration from TOML file, then apply environment overrides
pub fn load_config(path: &str) -> Result<BridgeConfig, GraphError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| GraphError::Config(format!("Failed to read {}: {}", path, e)))?;
    let mut config: BridgeConfig = toml::from_str(&contents)
        .map_err(|e| GraphError::Config(format!("Failed to parse {}: {}", path, e)))?;
    config.apply_env();
    Ok(config)
}
