use std::io;
use std::path::PathBuf;

use thiserror::Error;
use wbo_backup_core::BackupNameError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("list board store {}", .path.display())]
    ListBoards { path: PathBuf, source: io::Error },
    #[error("list backup store {}", .path.display())]
    ListBackups { path: PathBuf, source: io::Error },
    #[error("open board file {}", .path.display())]
    OpenBoard { path: PathBuf, source: io::Error },
    #[error("create backup file {}", .path.display())]
    CreateBackup { path: PathBuf, source: io::Error },
    #[error("copy board into {}", .path.display())]
    CopyBoard { path: PathBuf, source: io::Error },
    #[error("remove backup file {}", .path.display())]
    RemoveBackup { path: PathBuf, source: io::Error },
    #[error("read backup file {}", .path.display())]
    ReadBackup { path: PathBuf, source: io::Error },
    #[error("invalid backup name: {0}")]
    InvalidBackupName(#[from] BackupNameError),
}
