use chrono::{Duration, Utc};
use crmpilot_persist::{Credential, CredentialStore, InMemoryStore, Provider, StoredCredential};
use crmpilot_tools::{CredentialResolver, OAuthClient, ToolError, ToolRegistry, ToolsConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn salesforce(expires_in: Duration) -> Credential {
    Credential::Salesforce {
        access_token: "old-token".into(),
        refresh_token: Some("refresh-1".into()),
        instance_url: "https://acme.my.salesforce.com".into(),
        expires_at: Some(Utc::now() + expires_in),
    }
}

fn hubspot() -> Credential {
    Credential::HubSpot {
        access_token: "hs-token".into(),
        refresh_token: None,
        expires_at: None,
    }
}

fn registry(store: Arc<InMemoryStore>, config: ToolsConfig) -> ToolRegistry {
    let http = reqwest::Client::new();
    ToolRegistry::new(CredentialResolver::new(store, http.clone()), http, config)
}

#[tokio::test]
async fn test_no_salesforce_credential_means_no_salesforce_tools() {
    let store = Arc::new(InMemoryStore::new());
    store.upsert_credential(StoredCredential::new("u1", hubspot())).await.unwrap();

    let tools = registry(store, ToolsConfig::default())
        .build("data-steward", "u1", false)
        .await
        .unwrap();

    for name in ["get_data", "create_record", "update_records"] {
        assert!(!tools.contains(name), "{name} should be omitted");
    }
    assert_eq!(
        tools.names(),
        vec!["hubspot_create_contact", "hubspot_search", "hubspot_update_contact", "visualize_data"]
    );
}

#[tokio::test]
async fn test_tools_only_bind_connected_providers() {
    let store = Arc::new(InMemoryStore::new());
    store.upsert_credential(StoredCredential::new("u1", hubspot())).await.unwrap();

    let tools = registry(store, ToolsConfig::default())
        .build("data-steward", "u1", false)
        .await
        .unwrap();

    let providers: Vec<Option<Provider>> = tools
        .names()
        .into_iter()
        .filter_map(|name| tools.get(name))
        .map(|tool| tool.provider())
        .collect();
    assert!(!providers.contains(&Some(Provider::Salesforce)));
    assert_eq!(providers.iter().filter(|p| **p == Some(Provider::HubSpot)).count(), 3);
    // visualize_data needs no credential
    assert!(providers.contains(&None));
}

#[tokio::test]
async fn test_profile_selects_subset() {
    let store = Arc::new(InMemoryStore::new());
    store
        .upsert_credential(StoredCredential::new("u1", salesforce(Duration::hours(2))))
        .await
        .unwrap();

    let config = ToolsConfig {
        workflow_webhook_url: Some("https://hooks.example.com/run".into()),
        ..Default::default()
    };
    let registry = registry(store, config);

    let scheduler = registry.build("meeting-scheduler", "u1", false).await.unwrap();
    assert_eq!(scheduler.names(), vec!["get_data"]);

    let runner = registry.build("workflow-runner", "u1", false).await.unwrap();
    assert_eq!(runner.names(), vec!["get_data", "trigger_workflow"]);

    let steward = registry.build("data-steward", "u1", false).await.unwrap();
    assert!(!steward.contains("trigger_workflow"));
    assert!(steward.contains("update_records"));
}

#[tokio::test]
async fn test_web_search_needs_flag_and_key() {
    let store = Arc::new(InMemoryStore::new());
    let config = ToolsConfig {
        search_api_key: Some("search-key".into()),
        ..Default::default()
    };
    let registry = registry(store, config);

    assert!(!registry.build("prospect-finder", "u1", false).await.unwrap().contains("web_search"));
    assert!(registry.build("prospect-finder", "u1", true).await.unwrap().contains("web_search"));
    // data-steward never gets web search
    assert!(!registry.build("data-steward", "u1", true).await.unwrap().contains("web_search"));
}

#[tokio::test]
async fn test_unknown_agent_is_error() {
    let store = Arc::new(InMemoryStore::new());
    let err = registry(store, ToolsConfig::default())
        .build("sales-wizard", "u1", false)
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::UnknownAgent(_)));
}

#[tokio::test]
async fn test_expiring_credential_is_refreshed_and_stored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-token",
            "instance_url": "https://acme2.my.salesforce.com",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryStore::new());
    store
        .upsert_credential(StoredCredential::new("u1", salesforce(Duration::seconds(30))))
        .await
        .unwrap();

    let resolver = CredentialResolver::new(store.clone(), reqwest::Client::new()).with_oauth_client(
        Provider::Salesforce,
        OAuthClient::new(format!("{}/services/oauth2/token", server.uri()), "cid", "secret"),
    );

    let credential = resolver.resolve("u1", Provider::Salesforce).await.unwrap();
    assert_eq!(credential.access_token(), "new-token");
    assert_eq!(credential.refresh_token(), Some("refresh-1"));

    let stored = store.get_credential("u1", Provider::Salesforce).await.unwrap().unwrap();
    assert_eq!(stored.credential.access_token(), "new-token");
    match stored.credential {
        Credential::Salesforce { instance_url, expires_at, .. } => {
            assert_eq!(instance_url, "https://acme2.my.salesforce.com");
            assert!(expires_at.unwrap() > Utc::now() + Duration::minutes(30));
        }
        other => panic!("unexpected credential {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_refresh_omits_tools() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryStore::new());
    store
        .upsert_credential(StoredCredential::new("u1", salesforce(Duration::seconds(-10))))
        .await
        .unwrap();

    let http = reqwest::Client::new();
    let resolver = CredentialResolver::new(store.clone(), http.clone()).with_oauth_client(
        Provider::Salesforce,
        OAuthClient::new(format!("{}/token", server.uri()), "cid", "secret"),
    );
    let tools = ToolRegistry::new(resolver, http, ToolsConfig::default())
        .build("data-steward", "u1", false)
        .await
        .unwrap();

    assert!(!tools.contains("get_data"));
    assert!(tools.contains("visualize_data"));

    // the stale credential is left as it was
    let stored = store.get_credential("u1", Provider::Salesforce).await.unwrap().unwrap();
    assert_eq!(stored.credential.access_token(), "old-token");
}

#[tokio::test]
async fn test_toolset_reports_bad_arguments() {
    let store = Arc::new(InMemoryStore::new());
    let tools = registry(store, ToolsConfig::default())
        .build("data-steward", "u1", false)
        .await
        .unwrap();

    let err = tools.execute("visualize_data", "{not json").await.unwrap_err();
    assert!(matches!(err, ToolError::InvalidArguments(_)));

    let err = tools.execute("no_such_tool", "{}").await.unwrap_err();
    assert!(matches!(err, ToolError::UnknownTool(_)));
}
