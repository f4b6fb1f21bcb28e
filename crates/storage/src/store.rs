use wbo_backup_core::{BackupRecord, BoardFile};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    AlreadyAbsent,
}

/// Board store and backup store operations the backup cycle runs against.
///
/// The board store is only ever read; the backup store is owned by the engine.
#[async_trait::async_trait]
pub trait BackupStore: Send + Sync {
    /// Active boards, one per regular file in the board store.
    async fn list_boards(&self) -> Result<Vec<BoardFile>, StoreError>;

    /// Raw file names found in the backup store, in no particular order.
    async fn list_backups(&self) -> Result<Vec<String>, StoreError>;

    /// Copy a board's current file into a new timestamped backup.
    async fn write_snapshot(&self, board: &BoardFile) -> Result<BackupRecord, StoreError>;

    /// Remove a backup. A backup that is already gone is not an error.
    async fn delete_snapshot(&self, record: &BackupRecord) -> Result<DeleteOutcome, StoreError>;

    /// Contents of a backup file, `None` if it does not exist.
    async fn read_backup(&self, file_name: &str) -> Result<Option<Vec<u8>>, StoreError>;
}
