use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a run's ledger entry. A run with no entry yet has not
/// started; `Success` and `Failed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    InProgress,
    Success,
    Failed,
}

impl UsageStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl From<crmpilot_types::RunStatus> for UsageStatus {
    fn from(status: crmpilot_types::RunStatus) -> Self {
        match status {
            crmpilot_types::RunStatus::Success => Self::Success,
            crmpilot_types::RunStatus::Failed => Self::Failed,
        }
    }
}

/// Billable actions taken during one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLogEntry {
    pub log_id: String,
    pub user_id: String,
    pub agent: String,
    pub records_created: u64,
    pub records_updated: u64,
    pub meetings_booked: u64,
    pub status: UsageStatus,
    pub error_count: u64,
    #[serde(default)]
    pub progress_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Partial contribution of one tool call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDelta {
    pub records_created: u64,
    pub records_updated: u64,
    pub meetings_booked: u64,
    pub errors: u64,
    pub progress_message: Option<String>,
}

impl UsageDelta {
    pub fn created(n: u64) -> Self {
        Self { records_created: n, ..Default::default() }
    }

    pub fn updated(n: u64) -> Self {
        Self { records_updated: n, ..Default::default() }
    }

    pub fn meetings(n: u64) -> Self {
        Self { meetings_booked: n, ..Default::default() }
    }

    pub fn error() -> Self {
        Self { errors: 1, ..Default::default() }
    }

    pub fn with_progress(mut self, message: impl Into<String>) -> Self {
        self.progress_message = Some(message.into());
        self
    }

    pub fn is_mutation(&self) -> bool {
        self.records_created + self.records_updated + self.meetings_booked > 0
    }
}

impl UsageLogEntry {
    pub fn start(log_id: impl Into<String>, user_id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            log_id: log_id.into(),
            user_id: user_id.into(),
            agent: agent.into(),
            records_created: 0,
            records_updated: 0,
            meetings_booked: 0,
            status: UsageStatus::InProgress,
            error_count: 0,
            progress_message: None,
            timestamp: Utc::now(),
        }
    }

    /// Add `delta` to the running totals. Returns `false` (and changes
    /// nothing) once the entry is terminal.
    pub fn apply(&mut self, delta: &UsageDelta) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.records_created += delta.records_created;
        self.records_updated += delta.records_updated;
        self.meetings_booked += delta.meetings_booked;
        self.error_count += delta.errors;
        if let Some(message) = &delta.progress_message {
            self.progress_message = Some(message.clone());
        }
        self.timestamp = Utc::now();
        true
    }

    /// Move to a terminal status. A failure keeps the accumulated counts and
    /// the last progress message, and bumps `error_count`.
    pub fn finalize(&mut self, status: UsageStatus, message: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        match status {
            UsageStatus::Failed => {
                self.error_count += 1;
                if self.progress_message.is_none() {
                    self.progress_message = message;
                }
            }
            _ => {
                if message.is_some() {
                    self.progress_message = message;
                }
            }
        }
        self.status = status;
        self.timestamp = Utc::now();
        true
    }
}

/// Sums over a user's entries, for quota display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub runs: u64,
    pub failed_runs: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub meetings_booked: u64,
}

impl<'a> FromIterator<&'a UsageLogEntry> for UsageTotals {
    fn from_iter<I: IntoIterator<Item = &'a UsageLogEntry>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), |mut totals, entry| {
            totals.runs += 1;
            if entry.status == UsageStatus::Failed {
                totals.failed_runs += 1;
            }
            totals.records_created += entry.records_created;
            totals.records_updated += entry.records_updated;
            totals.meetings_booked += entry.meetings_booked;
            totals
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_updates_are_summed() {
        let mut entry = UsageLogEntry::start("log-1", "u1", "data-steward");
        assert!(entry.apply(&UsageDelta::updated(2)));
        assert!(entry.apply(&UsageDelta::updated(1).with_progress("Updated 3 records")));
        assert!(entry.apply(&UsageDelta::created(1)));

        assert_eq!(entry.records_updated, 3);
        assert_eq!(entry.records_created, 1);
        assert_eq!(entry.progress_message.as_deref(), Some("Updated 3 records"));
    }

    #[test]
    fn failure_keeps_partial_progress() {
        let mut entry = UsageLogEntry::start("log-1", "u1", "data-steward");
        entry.apply(&UsageDelta::updated(2).with_progress("Updated 2 records"));

        assert!(entry.finalize(UsageStatus::Failed, Some("model error".into())));
        assert_eq!(entry.status, UsageStatus::Failed);
        assert_eq!(entry.records_updated, 2);
        assert_eq!(entry.error_count, 1);
        assert_eq!(entry.progress_message.as_deref(), Some("Updated 2 records"));
    }

    #[test]
    fn terminal_entries_ignore_updates() {
        let mut entry = UsageLogEntry::start("log-1", "u1", "data-steward");
        entry.finalize(UsageStatus::Success, None);

        assert!(!entry.apply(&UsageDelta::created(5)));
        assert!(!entry.finalize(UsageStatus::Failed, None));
        assert_eq!(entry.records_created, 0);
        assert_eq!(entry.status, UsageStatus::Success);
    }

    #[test]
    fn totals_sum_entries() {
        let mut a = UsageLogEntry::start("a", "u1", "data-steward");
        a.apply(&UsageDelta::updated(3));
        let mut b = UsageLogEntry::start("b", "u1", "meeting-scheduler");
        b.apply(&UsageDelta::meetings(1));
        b.finalize(UsageStatus::Failed, None);

        let totals: UsageTotals = [a, b].iter().collect();
        assert_eq!(totals.runs, 2);
        assert_eq!(totals.failed_runs, 1);
        assert_eq!(totals.records_updated, 3);
        assert_eq!(totals.meetings_booked, 1);
    }
}
