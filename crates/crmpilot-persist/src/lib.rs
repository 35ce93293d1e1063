pub mod builder;
pub mod dbs;
pub mod error;
pub mod memory;
pub mod models;
pub mod prompts;
pub mod store;
pub mod templates;

pub use builder::{StorageBackend, Stores, StoresBuilder};
pub use error::{PersistError, Result};
pub use memory::InMemoryStore;
pub use models::{
    Credential, MessageRole, Provider, StoredCredential, Thread, ThreadMessage, ThreadSummary,
    UsageDelta, UsageLogEntry, UsageStatus, UsageTotals,
};
pub use prompts::PromptSelector;
pub use store::{CredentialStore, PromptStore, ThreadStore, UsageStore};
pub use templates::AGENTS;

#[cfg(feature = "mongodb")]
pub use dbs::mongo::MongoStore;
