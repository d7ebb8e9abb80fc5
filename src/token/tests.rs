use super::*;
use crate::config::MicrosoftConfig;
use crate::credentials::{ErrorPayload, Identity};
use crate::session::MemorySessionStore;
use mockito::{Matcher, Server, ServerGuard};

const TENANT: &str = "tenant-1";
const TOKEN_PATH: &str = "/tenant-1/oauth2/token";

fn manager_for(server: &ServerGuard, store: Arc<MemorySessionStore>) -> TokenManager {
    let config = MicrosoftConfig {
        tenant_id: TENANT.to_string(),
        client_id: "client-1".to_string(),
        client_secret: "s3cret".to_string(),
        redirect_uri: "http://localhost:3000/microsoft/callback".to_string(),
        authority: server.url(),
        graph_base_url: server.url(),
        ..MicrosoftConfig::default()
    };

    TokenManager::new(
        config.client_credentials(),
        ProviderEndpoints::from_config(&config),
        store,
        Sealer::from_key([9u8; 32]),
    )
}

fn bundle(access_token: &str, expires_on: i64) -> TokenBundle {
    TokenBundle {
        access_token: access_token.to_string(),
        refresh_token: "refresh-1".to_string(),
        expires_on,
        user: Identity {
            id: "user-1".to_string(),
            display_name: Some("Adele Vance".to_string()),
            ..Identity::default()
        },
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

mod complete_authorization_tests {
    use super::*;

    #[tokio::test]
    async fn code_is_exchanged_and_bundle_stored() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", TOKEN_PATH)
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "auth-code".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"issued-at","refresh_token":"issued-rt","expires_in":"3600"}"#)
            .expect(1)
            .create_async()
            .await;
        let me = server
            .mock("GET", "/me")
            .match_header("authorization", "Bearer issued-at")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"user-1","displayName":"Adele Vance"}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_for(&server, Arc::clone(&store));
        let mut outcomes = manager.subscribe();

        let callback = AuthorizationCallback::parse("code=auth-code&state=xyz").unwrap();
        let result = manager.complete_authorization("alice", &callback).await.unwrap();

        assert_eq!(result.access_token, "issued-at");
        assert_eq!(result.refresh_token, "issued-rt");
        assert_eq!(result.user.display_name.as_deref(), Some("Adele Vance"));
        assert!(result.expires_on > now());

        // Only ciphertext reaches the store
        let raw = store.get("alice").unwrap().unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("issued-at"));
        assert_eq!(manager.load_bundle("alice").unwrap(), result);

        match outcomes.recv().await.unwrap() {
            AuthOutcome::Succeeded { session, bundle } => {
                assert_eq!(session, "alice");
                let opened: TokenBundle = manager.sealer().open(&bundle).unwrap();
                assert_eq!(opened, result);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        token.assert_async().await;
        me.assert_async().await;
    }

    #[tokio::test]
    async fn provider_error_skips_exchange_and_emits_failure() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", TOKEN_PATH)
            .expect(0)
            .create_async()
            .await;

        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_for(&server, Arc::clone(&store));
        let mut outcomes = manager.subscribe();

        let callback =
            AuthorizationCallback::parse("error=access_denied&error_description=user+cancelled")
                .unwrap();
        let err = manager
            .complete_authorization("alice", &callback)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GraphError::AuthorizationDenied { ref error, ref description }
                if error == "access_denied" && description == "user cancelled"
        ));
        assert!(store.is_empty());

        match outcomes.recv().await.unwrap() {
            AuthOutcome::Failed { session, error } => {
                assert_eq!(session.as_deref(), Some("alice"));
                let payload: ErrorPayload = manager.sealer().open(&error).unwrap();
                assert_eq!(
                    payload,
                    ErrorPayload {
                        error: "access_denied".to_string(),
                        error_description: "user cancelled".to_string(),
                    }
                );
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        token.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_code_is_token_exchange_error() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", TOKEN_PATH)
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_for(&server, Arc::clone(&store));
        let mut outcomes = manager.subscribe();

        let callback = AuthorizationCallback::parse("code=stale").unwrap();
        let err = manager
            .complete_authorization("alice", &callback)
            .await
            .unwrap_err();

        assert!(matches!(err, GraphError::TokenExchange(ref msg) if msg.contains("invalid_grant")));
        assert!(store.is_empty());
        assert!(!outcomes.recv().await.unwrap().is_success());
    }

    #[tokio::test]
    async fn body_without_access_token_is_token_exchange_error() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", TOKEN_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token_type":"Bearer","expires_in":3600}"#)
            .create_async()
            .await;
        let me = server.mock("GET", "/me").expect(0).create_async().await;

        let manager = manager_for(&server, Arc::new(MemorySessionStore::new()));
        let callback = AuthorizationCallback::parse("code=c").unwrap();

        let err = manager
            .complete_authorization("alice", &callback)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::TokenExchange(_)));
        me.assert_async().await;
    }

    #[tokio::test]
    async fn callback_without_code_reports_failure() {
        let server = Server::new_async().await;
        let manager = manager_for(&server, Arc::new(MemorySessionStore::new()));

        let mut outcomes = manager.subscribe();

        let callback = AuthorizationCallback::parse("code=&state=xyz").unwrap();
        let err = manager.complete_authorization("alice", &callback).await.unwrap_err();
        assert!(matches!(err, GraphError::TokenExchange(_)));

        match outcomes.recv().await.unwrap() {
            AuthOutcome::Failed { session, error } => {
                assert_eq!(session.as_deref(), Some("alice"));
                let payload: ErrorPayload = manager.sealer().open(&error).unwrap();
                assert_eq!(payload.error, "token_exchange_failed");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn grant_without_refresh_token_is_accepted() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", TOKEN_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"only-at","expires_in":3600}"#)
            .create_async()
            .await;
        let _me = server
            .mock("GET", "/me")
            .with_status(200)
            .with_body(r#"{"id":"user-1"}"#)
            .create_async()
            .await;

        let manager = manager_for(&server, Arc::new(MemorySessionStore::new()));
        let callback = AuthorizationCallback::parse("code=auth-code&state=xyz").unwrap();

        let issued = manager.complete_authorization("alice", &callback).await.unwrap();
        assert_eq!(issued.access_token, "only-at");
        assert!(!issued.can_refresh());

        // The stored bundle still opens and serves its access token
        assert_eq!(manager.get_valid_access_token("alice").await.unwrap(), "only-at");
    }
}

mod get_valid_access_token_tests {
    use super::*;

    #[tokio::test]
    async fn fresh_token_makes_no_network_calls() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", TOKEN_PATH)
            .expect(0)
            .create_async()
            .await;

        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_for(&server, Arc::clone(&store));
        manager.save_bundle("alice", &bundle("stored-at", now() + 600)).unwrap();

        let access_token = manager.get_valid_access_token("alice").await.unwrap();
        assert_eq!(access_token, "stored-at");
        token.assert_async().await;
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_exactly_once() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", TOKEN_PATH)
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
                Matcher::UrlEncoded("scope".into(), "openid profile offline_access".into()),
                Matcher::UrlEncoded("client_id".into(), "client-1".into()),
                Matcher::UrlEncoded("client_secret".into(), "s3cret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"refreshed-at","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_for(&server, Arc::clone(&store));
        manager.save_bundle("alice", &bundle("stale-at", now() - 60)).unwrap();
        let mut outcomes = manager.subscribe();

        let access_token = manager.get_valid_access_token("alice").await.unwrap();
        assert_eq!(access_token, "refreshed-at");

        let stored = manager.load_bundle("alice").unwrap();
        assert_eq!(stored.access_token, "refreshed-at");
        // Provider did not rotate, original refresh token is kept
        assert_eq!(stored.refresh_token, "refresh-1");
        assert_eq!(stored.user.id, "user-1");

        // Refresh re-announces the updated bundle
        match outcomes.recv().await.unwrap() {
            AuthOutcome::Succeeded { session, bundle } => {
                assert_eq!(session, "alice");
                let opened: TokenBundle = manager.sealer().open(&bundle).unwrap();
                assert_eq!(opened.access_token, "refreshed-at");
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        // Second call uses the refreshed token
        assert_eq!(manager.get_valid_access_token("alice").await.unwrap(), "refreshed-at");
        token.assert_async().await;
    }

    #[tokio::test]
    async fn expiry_equal_to_now_counts_as_expired() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", TOKEN_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"refreshed-at","refresh_token":"rotated","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let manager = manager_for(&server, Arc::new(MemorySessionStore::new()));
        manager.save_bundle("alice", &bundle("stale-at", now())).unwrap();

        assert_eq!(manager.get_valid_access_token("alice").await.unwrap(), "refreshed-at");
        assert_eq!(manager.load_bundle("alice").unwrap().refresh_token, "rotated");
        token.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_failure_is_not_retried() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", TOKEN_PATH)
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"AADSTS700082: expired"}"#)
            .expect(1)
            .create_async()
            .await;

        let manager = manager_for(&server, Arc::new(MemorySessionStore::new()));
        manager.save_bundle("alice", &bundle("stale-at", now() - 60)).unwrap();

        let err = manager.get_valid_access_token("alice").await.unwrap_err();
        assert!(matches!(err, GraphError::TokenRefresh(ref msg) if msg.contains("invalid_grant")));
        assert!(err.requires_reauthorization());

        // The rejected bundle is gone: the next call never reaches the provider
        let err = manager.get_valid_access_token("alice").await.unwrap_err();
        assert!(matches!(err, GraphError::MissingSession(_)));
        assert!(err.requires_reauthorization());
        token.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_provider_keeps_bundle() {
        let server = Server::new_async().await;
        let store = Arc::new(MemorySessionStore::new());
        manager_for(&server, Arc::clone(&store))
            .save_bundle("alice", &bundle("stale-at", now() - 60))
            .unwrap();

        let unreachable = MicrosoftConfig {
            tenant_id: TENANT.to_string(),
            authority: "http://127.0.0.1:9".to_string(),
            ..MicrosoftConfig::default()
        };
        let manager = TokenManager::new(
            unreachable.client_credentials(),
            ProviderEndpoints::from_config(&unreachable),
            store,
            Sealer::from_key([9u8; 32]),
        );

        let err = manager.get_valid_access_token("alice").await.unwrap_err();
        assert!(matches!(err, GraphError::TokenRefresh(_)));
        assert_eq!(manager.load_bundle("alice").unwrap().access_token, "stale-at");
    }

    #[tokio::test]
    async fn expired_bundle_without_refresh_token_fails_offline() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", TOKEN_PATH)
            .expect(0)
            .create_async()
            .await;

        let manager = manager_for(&server, Arc::new(MemorySessionStore::new()));
        let mut expired = bundle("stale-at", now() - 60);
        expired.refresh_token.clear();
        manager.save_bundle("alice", &expired).unwrap();

        let err = manager.get_valid_access_token("alice").await.unwrap_err();
        assert!(matches!(err, GraphError::TokenRefresh(ref msg) if msg == "no refresh token"));
        assert!(matches!(manager.load_bundle("alice"), Err(GraphError::MissingSession(_))));
        token.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", TOKEN_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"refreshed-at","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let manager = manager_for(&server, Arc::new(MemorySessionStore::new()));
        manager.save_bundle("alice", &bundle("stale-at", now() - 60)).unwrap();

        let (first, second) = tokio::join!(
            manager.get_valid_access_token("alice"),
            manager.get_valid_access_token("alice")
        );

        assert_eq!(first.unwrap(), "refreshed-at");
        assert_eq!(second.unwrap(), "refreshed-at");
        assert!(manager.refresh_locks.is_empty());
        token.assert_async().await;
    }

    #[tokio::test]
    async fn missing_session() {
        let server = Server::new_async().await;
        let manager = manager_for(&server, Arc::new(MemorySessionStore::new()));

        let err = manager.get_valid_access_token("nobody").await.unwrap_err();
        assert!(matches!(err, GraphError::MissingSession(ref key) if key == "nobody"));
    }

    #[tokio::test]
    async fn garbage_session_is_corrupt_and_discarded() {
        let server = Server::new_async().await;
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_for(&server, Arc::clone(&store));
        store.put("alice", b"definitely not sealed".to_vec()).unwrap();

        let err = manager.get_valid_access_token("alice").await.unwrap_err();
        assert!(matches!(err, GraphError::CorruptSession(_)));
        assert!(store.get("alice").unwrap().is_none());

        // Once discarded, the session is simply missing
        let err = manager.get_valid_access_token("alice").await.unwrap_err();
        assert!(matches!(err, GraphError::MissingSession(_)));
    }

    #[tokio::test]
    async fn bundle_sealed_with_other_key_is_corrupt() {
        let server = Server::new_async().await;
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_for(&server, Arc::clone(&store));

        let foreign = Sealer::from_key([1u8; 32]).seal(&bundle("at", now() + 600)).unwrap();
        store.put("alice", foreign.into_bytes()).unwrap();

        let err = manager.get_valid_access_token("alice").await.unwrap_err();
        assert!(matches!(err, GraphError::CorruptSession(_)));
    }

    #[tokio::test]
    async fn bundle_missing_required_fields_is_corrupt() {
        let server = Server::new_async().await;
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_for(&server, Arc::clone(&store));

        let partial = serde_json::json!({ "access_token": "at", "expires_on": now() + 600 });
        let sealed = manager.sealer().seal(&partial).unwrap();
        store.put("alice", sealed.into_bytes()).unwrap();

        let err = manager.get_valid_access_token("alice").await.unwrap_err();
        assert!(matches!(err, GraphError::CorruptSession(_)));
    }
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn begin_authorization_builds_provider_url() {
        let server = Server::new_async().await;
        let manager = manager_for(&server, Arc::new(MemorySessionStore::new()));

        let request = AuthorizationRequest::new([".default"], true);
        let url = manager.begin_authorization(&request, "state-1");

        assert!(url.starts_with(&format!("{}/{}/oauth2/v2.0/authorize?", server.url(), TENANT)));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("scope=.default"));
        assert!(url.contains("state=state-1"));
        assert!(url.contains("prompt=consent"));
    }

    #[tokio::test]
    async fn forget_destroys_bundle() {
        let server = Server::new_async().await;
        let store = Arc::new(MemorySessionStore::new());
        let manager = manager_for(&server, Arc::clone(&store));
        manager.save_bundle("alice", &bundle("at", now() + 600)).unwrap();

        manager.forget("alice").unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            manager.get_valid_access_token("alice").await,
            Err(GraphError::MissingSession(_))
        ));
    }

    #[test]
    fn callback_query_parsing() {
        let callback = AuthorizationCallback::parse("?code=abc&state=s1").unwrap();
        assert_eq!(callback.code.as_deref(), Some("abc"));
        assert_eq!(callback.state.as_deref(), Some("s1"));
        assert!(!callback.is_error());

        let callback =
            AuthorizationCallback::parse("error=access_denied&error_description=User+cancelled")
                .unwrap();
        assert!(callback.is_error());
        assert_eq!(callback.error_description.as_deref(), Some("User cancelled"));
        assert_eq!(callback.code, None);
    }

    #[test]
    fn from_config_rejects_bad_key() {
        let mut config = BridgeConfig::default();
        config.session.encryption_key = "short".to_string();

        let result = TokenManager::from_config(&config, Arc::new(MemorySessionStore::new()));
        assert!(matches!(result, Err(GraphError::Config(_))));
    }
}
