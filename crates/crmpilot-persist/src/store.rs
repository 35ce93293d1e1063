use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Provider, StoredCredential, Thread, ThreadMessage, ThreadSummary, UsageDelta, UsageLogEntry,
    UsageStatus,
};

/// Conversation threads, keyed by thread id and scoped to their owner.
///
/// Every read and write takes the caller's `user_id`; a thread owned by
/// someone else behaves exactly like a missing one.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn create_thread(&self, user_id: &str, agent: &str) -> Result<Thread>;

    async fn get_thread(&self, thread_id: &str, user_id: &str) -> Result<Option<Thread>>;

    /// Newest first
    async fn list_threads(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<ThreadSummary>>;

    /// Append in one atomic write. Fails with `ThreadNotFound` when the
    /// thread is missing or not owned by `user_id`.
    async fn append_messages(
        &self,
        thread_id: &str,
        user_id: &str,
        messages: Vec<ThreadMessage>,
    ) -> Result<()>;

    /// Returns whether a thread was deleted
    async fn delete_thread(&self, thread_id: &str, user_id: &str) -> Result<bool>;

    /// Connectivity check for health probes
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Usage ledger. Updates for one `log_id` are additive.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Add `delta` to the entry for `log_id`, creating it in `InProgress` on
    /// first use. A terminal entry is returned unchanged.
    async fn record_usage(
        &self,
        log_id: &str,
        user_id: &str,
        agent: &str,
        delta: UsageDelta,
    ) -> Result<UsageLogEntry>;

    /// Set the terminal status. Returns `None` when the run never recorded
    /// usage.
    async fn finalize_usage(
        &self,
        log_id: &str,
        status: UsageStatus,
        message: Option<String>,
    ) -> Result<Option<UsageLogEntry>>;

    async fn get_usage(&self, log_id: &str) -> Result<Option<UsageLogEntry>>;

    /// Newest first, optionally restricted to one agent
    async fn list_usage(&self, user_id: &str, agent: Option<&str>) -> Result<Vec<UsageLogEntry>>;
}

/// Provider credentials, at most one per `(user_id, provider)`
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Stored documents are validated on the way out; an invalid one is an
    /// `InvalidCredential` error rather than a loosely-typed value.
    async fn get_credential(&self, user_id: &str, provider: Provider) -> Result<Option<StoredCredential>>;

    async fn upsert_credential(&self, credential: StoredCredential) -> Result<()>;

    async fn delete_credential(&self, user_id: &str, provider: Provider) -> Result<bool>;
}

/// Per-agent system prompt overrides
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn get_prompt(&self, agent: &str) -> Result<Option<String>>;

    async fn set_prompt(&self, agent: &str, prompt: String) -> Result<()>;
}
