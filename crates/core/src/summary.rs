use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counts from one completed backup cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub backed_up: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleSkipReason {
    /// Another cycle was still in flight.
    Overlap,
    /// Backups are administratively disabled.
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleSummary),
    Skipped(CycleSkipReason),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub finished_at: DateTime<Utc>,
    pub summary: CycleSummary,
}
