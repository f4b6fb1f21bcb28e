use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use wbo_backup_core::{
    plan_retention, BackupIndex, BackupRecord, BoardId, CycleOutcome, CycleReport, CycleSkipReason,
    CycleSummary, RetentionPolicy,
};

use crate::store::{BackupStore, DeleteOutcome};

/// Runs backup cycles against a [`BackupStore`], at most one at a time.
pub struct BackupEngine {
    store: Arc<dyn BackupStore>,
    enabled: bool,
    policy: RetentionPolicy,
    in_flight: AtomicBool,
    last_report: Mutex<Option<CycleReport>>,
}

/// Holds the single-flight flag for the duration of a cycle.
struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl BackupEngine {
    pub fn new(store: Arc<dyn BackupStore>, enabled: bool, policy: RetentionPolicy) -> Self {
        Self {
            store,
            enabled,
            policy,
            in_flight: AtomicBool::new(false),
            last_report: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<dyn BackupStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.lock().await.clone()
    }

    fn try_begin(&self) -> Option<CycleGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                flag: &self.in_flight,
            })
    }

    /// Runs one scan, plan and execute cycle.
    ///
    /// The cycle runs on its own task: dropping the returned future stops the
    /// wait, not the cycle. Returns `Err` only when one of the stores cannot
    /// be listed; per-board failures are counted in the summary.
    pub async fn run_cycle(self: &Arc<Self>) -> Result<CycleOutcome> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.cycle().await })
            .await
            .context("backup cycle task")?
    }

    async fn cycle(&self) -> Result<CycleOutcome> {
        let Some(_guard) = self.try_begin() else {
            info!(event = "cycle-skipped-overlap", "previous backup cycle still running, skipping");
            return Ok(CycleOutcome::Skipped(CycleSkipReason::Overlap));
        };

        if !self.enabled {
            debug!(event = "cycle-skipped-disabled", "backups disabled, skipping cycle");
            return Ok(CycleOutcome::Skipped(CycleSkipReason::Disabled));
        }

        let summary = match self.execute().await {
            Ok(summary) => summary,
            Err(e) => {
                error!(event = "cycle-failed", error = %format!("{e:#}"), "backup cycle aborted");
                return Err(e);
            }
        };

        info!(
            event = "cycle-summary",
            backed_up = summary.backed_up,
            deleted = summary.deleted,
            failed = summary.failed,
            "backup cycle finished"
        );
        *self.last_report.lock().await = Some(CycleReport {
            finished_at: Utc::now(),
            summary,
        });
        Ok(CycleOutcome::Completed(summary))
    }

    async fn execute(&self) -> Result<CycleSummary> {
        let boards = self.store.list_boards().await.context("list board store")?;
        let backup_names = self.store.list_backups().await.context("list backup store")?;

        let index = BackupIndex::build(backup_names, boards.iter().map(|b| b.id.clone()));
        let plan = plan_retention(&index, &self.policy, Utc::now().timestamp_millis());
        debug!(
            boards = index.len(),
            to_backup = plan.to_backup.len(),
            to_delete = plan.to_delete.len(),
            current = plan.current,
            "retention plan ready"
        );

        let mut summary = CycleSummary::default();

        let mut writes = JoinSet::new();
        for board in boards.into_iter().filter(|b| plan.to_backup.contains(&b.id)) {
            let store = Arc::clone(&self.store);
            writes.spawn(async move {
                let result = store.write_snapshot(&board).await;
                (board.id, result)
            });
        }

        let mut confirmed: BTreeSet<BoardId> = BTreeSet::new();
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((board, Ok(record))) => {
                    debug!(board = %board, file = %record.file_name, "board backed up");
                    summary.backed_up += 1;
                    confirmed.insert(board);
                }
                Ok((board, Err(e))) => {
                    error!(event = "backup-failed", board = %board, error = %e, "board backup failed");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(event = "backup-failed", error = %e, "backup task did not complete");
                    summary.failed += 1;
                }
            }
        }

        // Old copies only go once the board's replacement exists.
        let mut deletes = JoinSet::new();
        for record in plan.to_delete {
            if !confirmed.contains(&record.board) {
                info!(event = "delete-deferred", board = %record.board, file = %record.file_name, "no new backup this cycle, keeping old copy");
                continue;
            }
            let store = Arc::clone(&self.store);
            deletes.spawn(async move {
                let result = store.delete_snapshot(&record).await;
                (record, result)
            });
        }

        while let Some(joined) = deletes.join_next().await {
            match joined {
                Ok((record, Ok(outcome))) => {
                    if outcome == DeleteOutcome::AlreadyAbsent {
                        debug!(file = %record.file_name, "backup already gone");
                    }
                    summary.deleted += 1;
                }
                Ok((record, Err(e))) => {
                    error!(event = "delete-failed", board = %record.board, file = %record.file_name, error = %e, "backup removal failed");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(event = "delete-failed", error = %e, "delete task did not complete");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Backups of one active board, newest first. `None` when the board does
    /// not exist.
    pub async fn board_backups(&self, board: &str) -> Result<Option<Vec<BackupRecord>>> {
        let boards = self.store.list_boards().await.context("list board store")?;
        if !boards.iter().any(|b| b.id.as_str() == board) {
            return Ok(None);
        }
        let backup_names = self.store.list_backups().await.context("list backup store")?;
        let index = BackupIndex::build(backup_names, boards.into_iter().map(|b| b.id));
        Ok(index.backups(board).map(<[BackupRecord]>::to_vec))
    }
}
