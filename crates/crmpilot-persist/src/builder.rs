use std::sync::Arc;

use crate::error::{PersistError, Result};
use crate::memory::InMemoryStore;
use crate::store::{CredentialStore, PromptStore, ThreadStore, UsageStore};

/// Storage handles shared by the request handlers
#[derive(Clone)]
pub struct Stores {
    pub threads: Arc<dyn ThreadStore>,
    pub usage: Arc<dyn UsageStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub prompts: Arc<dyn PromptStore>,
}

impl Stores {
    /// All four stores backed by one in-memory instance
    pub fn in_memory() -> Self {
        Self::from_shared(Arc::new(InMemoryStore::new()))
    }

    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: ThreadStore + UsageStore + CredentialStore + PromptStore + 'static,
    {
        Self {
            threads: store.clone(),
            usage: store.clone(),
            credentials: store.clone(),
            prompts: store,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Memory,
    MongoDb,
}

impl std::str::FromStr for StorageBackend {
    type Err = PersistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" | "in_memory" => Ok(Self::Memory),
            "mongodb" | "mongo" => Ok(Self::MongoDb),
            other => Err(PersistError::Internal(format!("unknown storage backend: {other}"))),
        }
    }
}

pub struct StoresBuilder {
    backend: StorageBackend,
    mongodb_uri: Option<String>,
    database: Option<String>,
}

impl StoresBuilder {
    pub fn new() -> Self {
        Self {
            backend: StorageBackend::Memory,
            mongodb_uri: None,
            database: None,
        }
    }

    pub fn backend(mut self, backend: StorageBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn mongodb_uri(mut self, uri: impl Into<String>) -> Self {
        self.mongodb_uri = Some(uri.into());
        self
    }

    pub fn database(mut self, db: impl Into<String>) -> Self {
        self.database = Some(db.into());
        self
    }

    pub async fn build(self) -> Result<Stores> {
        match self.backend {
            StorageBackend::Memory => {
                tracing::info!("using in-memory storage");
                Ok(Stores::in_memory())
            }
            StorageBackend::MongoDb => self.build_mongo().await,
        }
    }

    #[cfg(feature = "mongodb")]
    async fn build_mongo(self) -> Result<Stores> {
        let uri = self
            .mongodb_uri
            .ok_or_else(|| PersistError::Internal("mongodb_uri is required".to_string()))?;
        let database = self
            .database
            .ok_or_else(|| PersistError::Internal("database is required".to_string()))?;

        let store = crate::dbs::mongo::MongoStore::connect(&uri, &database).await?;
        Ok(Stores::from_shared(Arc::new(store)))
    }

    #[cfg(not(feature = "mongodb"))]
    async fn build_mongo(self) -> Result<Stores> {
        Err(PersistError::Internal(
            "mongodb backend requested but crmpilot-persist was built without the `mongodb` feature".to_string(),
        ))
    }
}

impl Default for StoresBuilder {
    fn default() -> Self {
        Self::new()
    }
}
