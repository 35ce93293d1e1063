use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{PersistError, Result};
use crate::models::{
    Provider, StoredCredential, Thread, ThreadMessage, ThreadSummary, UsageDelta, UsageLogEntry,
    UsageStatus,
};
use crate::store::{CredentialStore, PromptStore, ThreadStore, UsageStore};

/// Process-local store implementing every store trait.
///
/// Default backend for development and the one tests run against. Each map
/// sits behind its own lock, so one call is one atomic update.
#[derive(Default)]
pub struct InMemoryStore {
    threads: RwLock<HashMap<String, Thread>>,
    usage: RwLock<HashMap<String, UsageLogEntry>>,
    credentials: RwLock<HashMap<(String, Provider), StoredCredential>>,
    prompts: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadStore for InMemoryStore {
    async fn create_thread(&self, user_id: &str, agent: &str) -> Result<Thread> {
        let thread = Thread::new(user_id, agent);
        self.threads.write().await.insert(thread.id.clone(), thread.clone());
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &str, user_id: &str) -> Result<Option<Thread>> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn list_threads(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<ThreadSummary>> {
        let threads = self.threads.read().await;
        let mut summaries: Vec<ThreadSummary> = threads
            .values()
            .filter(|t| t.user_id == user_id)
            .map(Thread::summary)
            .collect();
        summaries.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        if let Some(limit) = limit {
            summaries.truncate(limit);
        }
        Ok(summaries)
    }

    async fn append_messages(
        &self,
        thread_id: &str,
        user_id: &str,
        messages: Vec<ThreadMessage>,
    ) -> Result<()> {
        let mut threads = self.threads.write().await;
        let thread = threads
            .get_mut(thread_id)
            .filter(|t| t.user_id == user_id)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))?;
        thread.append(messages);
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str, user_id: &str) -> Result<bool> {
        let mut threads = self.threads.write().await;
        let owned = threads.get(thread_id).is_some_and(|t| t.user_id == user_id);
        if owned {
            threads.remove(thread_id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl UsageStore for InMemoryStore {
    async fn record_usage(
        &self,
        log_id: &str,
        user_id: &str,
        agent: &str,
        delta: UsageDelta,
    ) -> Result<UsageLogEntry> {
        let mut usage = self.usage.write().await;
        let entry = usage
            .entry(log_id.to_string())
            .or_insert_with(|| UsageLogEntry::start(log_id, user_id, agent));

        if !entry.apply(&delta) {
            tracing::warn!(log_id, status = entry.status.as_str(), "ignoring usage update on finished run");
        }
        Ok(entry.clone())
    }

    async fn finalize_usage(
        &self,
        log_id: &str,
        status: UsageStatus,
        message: Option<String>,
    ) -> Result<Option<UsageLogEntry>> {
        let mut usage = self.usage.write().await;
        let Some(entry) = usage.get_mut(log_id) else {
            return Ok(None);
        };

        if !entry.finalize(status, message) {
            tracing::warn!(log_id, status = entry.status.as_str(), "usage entry already finalized");
        }
        Ok(Some(entry.clone()))
    }

    async fn get_usage(&self, log_id: &str) -> Result<Option<UsageLogEntry>> {
        Ok(self.usage.read().await.get(log_id).cloned())
    }

    async fn list_usage(&self, user_id: &str, agent: Option<&str>) -> Result<Vec<UsageLogEntry>> {
        let usage = self.usage.read().await;
        let mut entries: Vec<UsageLogEntry> = usage
            .values()
            .filter(|e| e.user_id == user_id)
            .filter(|e| agent.map_or(true, |a| e.agent == a))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn get_credential(&self, user_id: &str, provider: Provider) -> Result<Option<StoredCredential>> {
        let credentials = self.credentials.read().await;
        match credentials.get(&(user_id.to_string(), provider)) {
            Some(stored) => {
                stored.validate()?;
                Ok(Some(stored.clone()))
            }
            None => Ok(None),
        }
    }

    async fn upsert_credential(&self, mut credential: StoredCredential) -> Result<()> {
        credential.validate()?;
        credential.updated_at = Utc::now();
        self.credentials
            .write()
            .await
            .insert((credential.user_id.clone(), credential.provider), credential);
        Ok(())
    }

    async fn delete_credential(&self, user_id: &str, provider: Provider) -> Result<bool> {
        Ok(self
            .credentials
            .write()
            .await
            .remove(&(user_id.to_string(), provider))
            .is_some())
    }
}

#[async_trait]
impl PromptStore for InMemoryStore {
    async fn get_prompt(&self, agent: &str) -> Result<Option<String>> {
        Ok(self.prompts.read().await.get(agent).cloned())
    }

    async fn set_prompt(&self, agent: &str, prompt: String) -> Result<()> {
        self.prompts.write().await.insert(agent.to_string(), prompt);
        Ok(())
    }
}
