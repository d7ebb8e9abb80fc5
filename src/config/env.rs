use super::{BridgeConfig, SessionBackend};

/// Applies environment overrides through `lookup` so tests can supply their own.
pub(super) fn apply<F>(config: &mut BridgeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let ms = &mut config.microsoft;
    if let Some(v) = lookup("MS_TENANT_ID") {
        ms.tenant_id = v;
    }
    if let Some(v) = lookup("MS_CLIENT_ID") {
        ms.client_id = v;
    }
    if let Some(v) = lookup("MS_CLIENT_SECRET") {
        ms.client_secret = v;
    }
    if let Some(v) = lookup("MS_REDIRECT_URL") {
        ms.redirect_uri = v;
    }
    if let Some(v) = lookup("MS_REDIRECT_AFTER_CALLBACK") {
        ms.redirect_after_callback = v;
    }

    if let Some(v) = lookup("MS_ONEDRIVE_ROOT") {
        config.onedrive.root = v;
    }

    if let Some(v) = lookup("GRAPH_BRIDGE_ENCRYPTION_KEY") {
        config.session.encryption_key = v;
    }
    if let Some(v) = lookup("GRAPH_BRIDGE_SESSION_DB") {
        config.session.database = v;
        config.session.backend = SessionBackend::Sqlite;
    }

    if let Some(v) = lookup("GRAPH_BRIDGE_PORT") {
        match v.parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(_) => tracing::warn!(value = %v, "Ignoring invalid GRAPH_BRIDGE_PORT"),
        }
    }
    if let Some(v) = lookup("GRAPH_BRIDGE_AUTH_ENABLED") {
        match v.parse::<bool>() {
            Ok(b) => config.server.auth_enabled = b,
            Err(_) => tracing::warn!(value = %v, "Ignoring invalid GRAPH_BRIDGE_AUTH_ENABLED"),
        }
    }
}
