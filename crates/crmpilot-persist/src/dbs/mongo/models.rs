use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Thread, ThreadMessage, UsageLogEntry, UsageStatus};

/// Thread document; the thread id is the primary key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoThread {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub agent: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl From<Thread> for MongoThread {
    fn from(thread: Thread) -> Self {
        Self {
            id: thread.id,
            user_id: thread.user_id,
            agent: thread.agent,
            name: thread.name,
            messages: thread.messages,
            created_at: thread.created_at,
            last_updated: thread.last_updated,
        }
    }
}

impl From<MongoThread> for Thread {
    fn from(doc: MongoThread) -> Self {
        Self {
            id: doc.id,
            user_id: doc.user_id,
            agent: doc.agent,
            name: doc.name,
            messages: doc.messages,
            created_at: doc.created_at,
            last_updated: doc.last_updated,
        }
    }
}

/// Usage ledger document keyed by log id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUsageEntry {
    #[serde(rename = "_id")]
    pub log_id: String,
    pub user_id: String,
    pub agent: String,
    #[serde(default)]
    pub records_created: i64,
    #[serde(default)]
    pub records_updated: i64,
    #[serde(default)]
    pub meetings_booked: i64,
    pub status: UsageStatus,
    #[serde(default)]
    pub error_count: i64,
    #[serde(default)]
    pub progress_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<MongoUsageEntry> for UsageLogEntry {
    fn from(doc: MongoUsageEntry) -> Self {
        Self {
            log_id: doc.log_id,
            user_id: doc.user_id,
            agent: doc.agent,
            records_created: doc.records_created.max(0) as u64,
            records_updated: doc.records_updated.max(0) as u64,
            meetings_booked: doc.meetings_booked.max(0) as u64,
            status: doc.status,
            error_count: doc.error_count.max(0) as u64,
            progress_message: doc.progress_message,
            timestamp: doc.timestamp,
        }
    }
}

impl From<&UsageLogEntry> for MongoUsageEntry {
    fn from(entry: &UsageLogEntry) -> Self {
        Self {
            log_id: entry.log_id.clone(),
            user_id: entry.user_id.clone(),
            agent: entry.agent.clone(),
            records_created: entry.records_created as i64,
            records_updated: entry.records_updated as i64,
            meetings_booked: entry.meetings_booked as i64,
            status: entry.status,
            error_count: entry.error_count as i64,
            progress_message: entry.progress_message.clone(),
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPrompt {
    #[serde(rename = "_id")]
    pub agent: String,
    pub prompt: String,
}

pub fn credential_key(user_id: &str, provider: &str) -> String {
    format!("{user_id}:{provider}")
}
