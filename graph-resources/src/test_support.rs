use chrono::Utc;
use graph_bridge::config::MicrosoftConfig;
use graph_bridge::credentials::{Identity, Sealer, TokenBundle};
use graph_bridge::session::MemorySessionStore;
use graph_bridge::token::ProviderEndpoints;
use graph_bridge::{Dispatcher, TokenManager};
use mockito::ServerGuard;
use std::sync::Arc;

pub const ACCESS_TOKEN: &str = "test-access-token";

/// Dispatcher for session "tester" against `server`, holding a token valid for an hour.
pub fn dispatcher(server: &ServerGuard) -> Arc<Dispatcher> {
    let config = MicrosoftConfig {
        tenant_id: "tenant".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "http://localhost/cb".to_string(),
        authority: server.url(),
        graph_base_url: server.url(),
        ..MicrosoftConfig::default()
    };

    let tokens = TokenManager::new(
        config.client_credentials(),
        ProviderEndpoints::from_config(&config),
        Arc::new(MemorySessionStore::new()),
        Sealer::from_key([11u8; 32]),
    );
    tokens
        .save_bundle(
            "tester",
            &TokenBundle {
                access_token: ACCESS_TOKEN.to_string(),
                refresh_token: "test-refresh-token".to_string(),
                expires_on: Utc::now().timestamp() + 3600,
                user: Identity::default(),
            },
        )
        .unwrap();

    Arc::new(Dispatcher::new(Arc::new(tokens), "tester"))
}
