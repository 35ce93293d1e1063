use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::{Client, Collection, Database};

use super::models::{credential_key, MongoPrompt, MongoThread, MongoUsageEntry};
use crate::error::{PersistError, Result};
use crate::models::thread::derive_name;
use crate::models::{
    Provider, StoredCredential, Thread, ThreadMessage, ThreadSummary, UsageDelta, UsageLogEntry,
    UsageStatus,
};
use crate::store::{CredentialStore, PromptStore, ThreadStore, UsageStore};

/// MongoDB backend: collections `threads`, `usage_logs`, `credentials`, `prompts`
pub struct MongoStore {
    db: Database,
    threads: Collection<MongoThread>,
    usage: Collection<MongoUsageEntry>,
    credentials: Collection<Document>,
    prompts: Collection<MongoPrompt>,
}

impl MongoStore {
    pub async fn connect(mongodb_uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        let db = client.database(database);
        tracing::info!(database, "connected to MongoDB");

        Ok(Self {
            threads: db.collection("threads"),
            usage: db.collection("usage_logs"),
            credentials: db.collection("credentials"),
            prompts: db.collection("prompts"),
            db,
        })
    }
}

#[async_trait]
impl ThreadStore for MongoStore {
    async fn create_thread(&self, user_id: &str, agent: &str) -> Result<Thread> {
        let thread = Thread::new(user_id, agent);
        self.threads.insert_one(MongoThread::from(thread.clone())).await?;
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &str, user_id: &str) -> Result<Option<Thread>> {
        let filter = doc! { "_id": thread_id, "user_id": user_id };
        Ok(self.threads.find_one(filter).await?.map(Thread::from))
    }

    async fn list_threads(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<ThreadSummary>> {
        let mut find = self
            .threads
            .find(doc! { "user_id": user_id })
            .sort(doc! { "last_updated": -1 });
        if let Some(limit) = limit {
            find = find.limit(limit as i64);
        }

        let docs: Vec<MongoThread> = find.await?.try_collect().await?;
        Ok(docs.into_iter().map(|d| Thread::from(d).summary()).collect())
    }

    async fn append_messages(
        &self,
        thread_id: &str,
        user_id: &str,
        messages: Vec<ThreadMessage>,
    ) -> Result<()> {
        let name = derive_name(&messages);
        let now = bson::to_bson(&Utc::now())?;

        // single $push keeps the append atomic for concurrent turns
        let result = self
            .threads
            .update_one(
                doc! { "_id": thread_id, "user_id": user_id },
                doc! {
                    "$push": { "messages": { "$each": bson::to_bson(&messages)? } },
                    "$set": { "last_updated": now },
                },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(PersistError::ThreadNotFound(thread_id.to_string()));
        }

        if let Some(name) = name {
            self.threads
                .update_one(
                    doc! { "_id": thread_id, "name": Bson::Null },
                    doc! { "$set": { "name": name } },
                )
                .await?;
        }
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str, user_id: &str) -> Result<bool> {
        let result = self
            .threads
            .delete_one(doc! { "_id": thread_id, "user_id": user_id })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

#[async_trait]
impl UsageStore for MongoStore {
    async fn record_usage(
        &self,
        log_id: &str,
        user_id: &str,
        agent: &str,
        delta: UsageDelta,
    ) -> Result<UsageLogEntry> {
        if let Some(existing) = self.usage.find_one(doc! { "_id": log_id }).await? {
            if existing.status.is_terminal() {
                tracing::warn!(log_id, status = existing.status.as_str(), "ignoring usage update on finished run");
                return Ok(existing.into());
            }
        }

        let mut set = doc! { "timestamp": bson::to_bson(&Utc::now())? };
        if let Some(message) = &delta.progress_message {
            set.insert("progress_message", message.as_str());
        }

        self.usage
            .update_one(
                doc! { "_id": log_id, "status": UsageStatus::InProgress.as_str() },
                doc! {
                    "$inc": {
                        "records_created": delta.records_created as i64,
                        "records_updated": delta.records_updated as i64,
                        "meetings_booked": delta.meetings_booked as i64,
                        "error_count": delta.errors as i64,
                    },
                    "$set": set,
                    "$setOnInsert": {
                        "user_id": user_id,
                        "agent": agent,
                    },
                },
            )
            .upsert(true)
            .await?;

        self.usage
            .find_one(doc! { "_id": log_id })
            .await?
            .map(UsageLogEntry::from)
            .ok_or_else(|| PersistError::UsageLogNotFound(log_id.to_string()))
    }

    async fn finalize_usage(
        &self,
        log_id: &str,
        status: UsageStatus,
        message: Option<String>,
    ) -> Result<Option<UsageLogEntry>> {
        let Some(doc) = self.usage.find_one(doc! { "_id": log_id }).await? else {
            return Ok(None);
        };

        let mut entry = UsageLogEntry::from(doc);
        if !entry.finalize(status, message) {
            tracing::warn!(log_id, status = entry.status.as_str(), "usage entry already finalized");
            return Ok(Some(entry));
        }

        self.usage
            .replace_one(
                doc! { "_id": log_id, "status": UsageStatus::InProgress.as_str() },
                MongoUsageEntry::from(&entry),
            )
            .await?;
        Ok(Some(entry))
    }

    async fn get_usage(&self, log_id: &str) -> Result<Option<UsageLogEntry>> {
        Ok(self
            .usage
            .find_one(doc! { "_id": log_id })
            .await?
            .map(UsageLogEntry::from))
    }

    async fn list_usage(&self, user_id: &str, agent: Option<&str>) -> Result<Vec<UsageLogEntry>> {
        let mut filter = doc! { "user_id": user_id };
        if let Some(agent) = agent {
            filter.insert("agent", agent);
        }

        let docs: Vec<MongoUsageEntry> = self
            .usage
            .find(filter)
            .sort(doc! { "timestamp": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(docs.into_iter().map(UsageLogEntry::from).collect())
    }
}

#[async_trait]
impl CredentialStore for MongoStore {
    async fn get_credential(&self, user_id: &str, provider: Provider) -> Result<Option<StoredCredential>> {
        let key = credential_key(user_id, provider.as_str());
        let Some(mut document) = self.credentials.find_one(doc! { "_id": &key }).await? else {
            return Ok(None);
        };
        document.remove("_id");

        // documents are written by OAuth callbacks outside this service
        let value = Bson::Document(document).into_relaxed_extjson();
        StoredCredential::from_json(value).map(Some)
    }

    async fn upsert_credential(&self, mut credential: StoredCredential) -> Result<()> {
        credential.validate()?;
        credential.updated_at = Utc::now();

        let key = credential_key(&credential.user_id, credential.provider.as_str());
        let mut document = bson::to_document(&credential)?;
        document.insert("_id", key.as_str());

        self.credentials
            .replace_one(doc! { "_id": key.as_str() }, document)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn delete_credential(&self, user_id: &str, provider: Provider) -> Result<bool> {
        let key = credential_key(user_id, provider.as_str());
        let result = self.credentials.delete_one(doc! { "_id": key }).await?;
        Ok(result.deleted_count > 0)
    }
}

#[async_trait]
impl PromptStore for MongoStore {
    async fn get_prompt(&self, agent: &str) -> Result<Option<String>> {
        Ok(self
            .prompts
            .find_one(doc! { "_id": agent })
            .await?
            .map(|p| p.prompt))
    }

    async fn set_prompt(&self, agent: &str, prompt: String) -> Result<()> {
        self.prompts
            .replace_one(
                doc! { "_id": agent },
                MongoPrompt { agent: agent.to_string(), prompt },
            )
            .upsert(true)
            .await?;
        Ok(())
    }
}
