mod credential;
mod message;
pub(crate) mod thread;
mod usage;

pub use credential::{Credential, Provider, StoredCredential};
pub use message::{MessageRole, ThreadMessage};
pub use thread::{Thread, ThreadSummary};
pub use usage::{UsageDelta, UsageLogEntry, UsageStatus, UsageTotals};
