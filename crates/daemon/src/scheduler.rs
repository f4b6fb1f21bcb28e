use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use wbo_backup_core::CycleOutcome;
use wbo_backup_storage::BackupEngine;

/// Starts a cycle every `period`, first one immediately.
///
/// Each tick spawns its own task, so a cycle that outlives the period makes
/// the next tick a skipped overlap instead of queueing behind it.
pub async fn scheduler_loop(engine: Arc<BackupEngine>, period: Duration) {
    info!(period_secs = period.as_secs(), "backup scheduler started");
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            match engine.run_cycle().await {
                Ok(CycleOutcome::Completed(summary)) => debug!(?summary, "scheduled cycle done"),
                Ok(CycleOutcome::Skipped(reason)) => debug!(?reason, "scheduled cycle skipped"),
                Err(e) => debug!(error = %format!("{e:#}"), "scheduled cycle aborted"),
            }
        });
    }
}
