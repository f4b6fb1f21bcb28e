pub mod board;
pub mod index;
pub mod retention;
pub mod summary;

pub use board::{BackupNameError, BackupRecord, BoardFile, BoardId, BACKUP_SEPARATOR};
pub use index::BackupIndex;
pub use retention::{plan_retention, RetentionPlan, RetentionPolicy};
pub use summary::{CycleOutcome, CycleReport, CycleSkipReason, CycleSummary};
