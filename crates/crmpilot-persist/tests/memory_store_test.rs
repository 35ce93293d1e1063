use chrono::{Duration, Utc};
use crmpilot_persist::{
    Credential, CredentialStore, InMemoryStore, PromptSelector, PromptStore, Provider,
    StoredCredential, ThreadMessage, ThreadStore, UsageDelta, UsageStatus, UsageStore,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn salesforce_credential(user_id: &str, token: &str) -> StoredCredential {
    StoredCredential::new(
        user_id,
        Credential::Salesforce {
            access_token: token.to_string(),
            refresh_token: Some("refresh".to_string()),
            instance_url: "https://acme.my.salesforce.com".to_string(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        },
    )
}

#[tokio::test]
async fn test_append_is_ordered_and_append_only() {
    let store = InMemoryStore::new();
    let thread = store.create_thread("u1", "data-steward").await.unwrap();

    store
        .append_messages(&thread.id, "u1", vec![ThreadMessage::user("one"), ThreadMessage::assistant("two")])
        .await
        .unwrap();
    let before = store.get_thread(&thread.id, "u1").await.unwrap().unwrap().messages;

    store
        .append_messages(&thread.id, "u1", vec![ThreadMessage::user("three")])
        .await
        .unwrap();
    let after = store.get_thread(&thread.id, "u1").await.unwrap().unwrap().messages;

    assert_eq!(&after[..before.len()], &before[..]);
    let contents: Vec<&str> = after.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_threads_are_owner_scoped() {
    let store = InMemoryStore::new();
    let thread = store.create_thread("owner", "data-steward").await.unwrap();

    assert!(store.get_thread(&thread.id, "intruder").await.unwrap().is_none());
    assert!(store
        .append_messages(&thread.id, "intruder", vec![ThreadMessage::user("hi")])
        .await
        .is_err());
    assert!(!store.delete_thread(&thread.id, "intruder").await.unwrap());
    assert!(store.list_threads("intruder", None).await.unwrap().is_empty());

    assert!(store.delete_thread(&thread.id, "owner").await.unwrap());
    assert!(store.get_thread(&thread.id, "owner").await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_threads_newest_first() {
    let store = InMemoryStore::new();
    let older = store.create_thread("u1", "data-steward").await.unwrap();
    let newer = store.create_thread("u1", "prospect-finder").await.unwrap();
    store
        .append_messages(&older.id, "u1", vec![ThreadMessage::user("bump")])
        .await
        .unwrap();

    let listed = store.list_threads("u1", None).await.unwrap();
    assert_eq!(listed[0].id, older.id);
    assert_eq!(listed[1].id, newer.id);
    assert_eq!(listed[0].name.as_deref(), Some("bump"));

    assert_eq!(store.list_threads("u1", Some(1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_usage_is_additive_per_log_id() {
    let store = InMemoryStore::new();

    store.record_usage("run-1", "u1", "data-steward", UsageDelta::updated(1)).await.unwrap();
    store.record_usage("run-1", "u1", "data-steward", UsageDelta::updated(2)).await.unwrap();
    store.record_usage("run-1", "u1", "data-steward", UsageDelta::created(1)).await.unwrap();
    store.record_usage("run-2", "u1", "data-steward", UsageDelta::created(5)).await.unwrap();

    let entry = store.get_usage("run-1").await.unwrap().unwrap();
    assert_eq!(entry.records_updated, 3);
    assert_eq!(entry.records_created, 1);
    assert_eq!(entry.status, UsageStatus::InProgress);
}

#[tokio::test]
async fn test_concurrent_usage_updates_are_not_lost() {
    let store = Arc::new(InMemoryStore::new());

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .record_usage("run-1", "u1", "data-steward", UsageDelta::updated(1))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.get_usage("run-1").await.unwrap().unwrap().records_updated, 20);
}

#[tokio::test]
async fn test_finalized_usage_is_absorbing() {
    let store = InMemoryStore::new();
    assert!(store.finalize_usage("never-started", UsageStatus::Success, None).await.unwrap().is_none());

    store
        .record_usage("run-1", "u1", "data-steward", UsageDelta::updated(2).with_progress("Updated 2"))
        .await
        .unwrap();
    let failed = store
        .finalize_usage("run-1", UsageStatus::Failed, Some("boom".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.records_updated, 2);
    assert_eq!(failed.error_count, 1);
    assert_eq!(failed.progress_message.as_deref(), Some("Updated 2"));

    let after = store.record_usage("run-1", "u1", "data-steward", UsageDelta::updated(9)).await.unwrap();
    assert_eq!(after.records_updated, 2);
    assert_eq!(after.status, UsageStatus::Failed);
}

#[tokio::test]
async fn test_list_usage_filters_by_agent() {
    let store = InMemoryStore::new();
    store.record_usage("a", "u1", "data-steward", UsageDelta::updated(1)).await.unwrap();
    store.record_usage("b", "u1", "meeting-scheduler", UsageDelta::meetings(1)).await.unwrap();
    store.record_usage("c", "u2", "data-steward", UsageDelta::updated(1)).await.unwrap();

    assert_eq!(store.list_usage("u1", None).await.unwrap().len(), 2);
    let steward = store.list_usage("u1", Some("data-steward")).await.unwrap();
    assert_eq!(steward.len(), 1);
    assert_eq!(steward[0].log_id, "a");
}

#[tokio::test]
async fn test_one_credential_per_user_and_provider() {
    let store = InMemoryStore::new();
    store.upsert_credential(salesforce_credential("u1", "first")).await.unwrap();
    store.upsert_credential(salesforce_credential("u1", "second")).await.unwrap();

    let stored = store.get_credential("u1", Provider::Salesforce).await.unwrap().unwrap();
    assert_eq!(stored.credential.access_token(), "second");
    assert!(store.get_credential("u1", Provider::HubSpot).await.unwrap().is_none());
    assert!(store.get_credential("u2", Provider::Salesforce).await.unwrap().is_none());

    assert!(store.delete_credential("u1", Provider::Salesforce).await.unwrap());
    assert!(store.get_credential("u1", Provider::Salesforce).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_credential_is_rejected_on_write() {
    let store = InMemoryStore::new();
    let bad = salesforce_credential("u1", "  ");
    assert!(store.upsert_credential(bad).await.is_err());
}

#[tokio::test]
async fn test_prompt_selector_prefers_override() {
    let store = Arc::new(InMemoryStore::new());
    let selector = PromptSelector::new(store.clone());

    let default = selector.select("data-steward").await.unwrap().unwrap();
    assert!(default.contains("data steward"));
    assert!(!default.contains("{current_date}"));

    store.set_prompt("data-steward", "Custom prompt".into()).await.unwrap();
    assert_eq!(selector.select("data-steward").await.unwrap().as_deref(), Some("Custom prompt"));

    assert!(selector.select("unknown-agent").await.unwrap().is_none());
}
