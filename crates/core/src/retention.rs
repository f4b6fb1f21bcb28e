use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::board::{BackupRecord, BoardId};
use crate::index::BackupIndex;

pub const DEFAULT_MAX_COPIES: usize = 10;
pub const DEFAULT_MIN_INTERVAL_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Backups kept per board. Zero turns backups off entirely.
    pub max_copies: usize,
    /// Minimum age of a board's newest backup before another is taken.
    pub min_interval_ms: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_copies: DEFAULT_MAX_COPIES,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
        }
    }
}

impl RetentionPolicy {
    pub fn is_disabled(&self) -> bool {
        self.max_copies < 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub to_backup: BTreeSet<BoardId>,
    pub to_delete: BTreeSet<BackupRecord>,
    /// Boards whose newest backup is still within the interval.
    pub current: usize,
}

impl RetentionPlan {
    pub fn is_empty(&self) -> bool {
        self.to_backup.is_empty() && self.to_delete.is_empty()
    }
}

/// Decides which boards get a new snapshot and which old snapshots go.
///
/// A board is only pruned alongside a fresh backup: after adding one it would
/// hold `existing + 1` copies, so the oldest `existing + 1 - max_copies` are
/// scheduled for deletion. Boards that are not due are left alone even when
/// they already exceed the limit.
pub fn plan_retention(index: &BackupIndex, policy: &RetentionPolicy, now_ms: i64) -> RetentionPlan {
    let mut plan = RetentionPlan::default();
    if policy.is_disabled() {
        return plan;
    }

    for (board, backups) in index.boards() {
        let due = match backups.first() {
            None => true,
            Some(newest) => now_ms.saturating_sub(newest.timestamp_ms) >= policy.min_interval_ms,
        };
        if !due {
            plan.current += 1;
            continue;
        }

        plan.to_backup.insert(board.clone());
        let surplus = (backups.len() + 1).saturating_sub(policy.max_copies);
        plan.to_delete
            .extend(backups.iter().rev().take(surplus).cloned());
    }

    plan
}
