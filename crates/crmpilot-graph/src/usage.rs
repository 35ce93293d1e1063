use crmpilot_persist::{UsageDelta, UsageLogEntry, UsageStatus, UsageStore};
use crmpilot_types::{RunStatus, TurnState};
use std::sync::Arc;

/// Writes one run's tool results to the usage ledger.
///
/// The ledger entry is keyed by the run id and created by the store on the
/// first recorded tool call, so runs that never call a tool leave no entry.
/// Store failures are logged and never fail the turn.
#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn UsageStore>,
    log_id: String,
    user_id: String,
    agent: String,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn UsageStore>, state: &TurnState) -> Self {
        Self {
            store,
            log_id: state.run_id.clone(),
            user_id: state.user_id.clone(),
            agent: state.agent.clone(),
        }
    }

    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    pub async fn record(&self, delta: UsageDelta) -> Option<UsageLogEntry> {
        match self
            .store
            .record_usage(&self.log_id, &self.user_id, &self.agent, delta)
            .await
        {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(log_id = %self.log_id, error = %e, "failed to record usage");
                None
            }
        }
    }

    pub async fn finalize(&self, status: RunStatus, message: Option<String>) -> Option<UsageLogEntry> {
        match self
            .store
            .finalize_usage(&self.log_id, UsageStatus::from(status), message)
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(log_id = %self.log_id, error = %e, "failed to finalize usage");
                None
            }
        }
    }
}
