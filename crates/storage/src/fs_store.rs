use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use wbo_backup_core::{BackupRecord, BoardFile};

use crate::error::StoreError;
use crate::store::{BackupStore, DeleteOutcome};

/// Timestamp bumps tried when a backup name is already taken.
const MAX_NAME_ATTEMPTS: i64 = 16;

const PARTIAL_SUFFIX: &str = ".partial";

/// Board store and backup store as two plain directories.
#[derive(Debug, Clone)]
pub struct FsBackupStore {
    board_dir: PathBuf,
    backup_dir: PathBuf,
}

impl FsBackupStore {
    pub fn new(board_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            board_dir: board_dir.into(),
            backup_dir: backup_dir.into(),
        }
    }

    /// Creates both directories if they do not exist yet.
    pub async fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.board_dir)
            .await
            .with_context(|| format!("create board dir: {}", self.board_dir.display()))?;
        fs::create_dir_all(&self.backup_dir)
            .await
            .with_context(|| format!("create backup dir: {}", self.backup_dir.display()))?;
        Ok(())
    }

    pub fn board_dir(&self) -> &Path {
        &self.board_dir
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Hidden staging file a snapshot is copied into before it gets its
    /// backup name.
    fn partial_path(&self, board: &BoardFile) -> PathBuf {
        self.backup_dir.join(format!(".{}{PARTIAL_SUFFIX}", board.file_name))
    }

    /// Links a finished staging file under a fresh backup name, never
    /// replacing an existing backup.
    async fn publish(&self, board: &BoardFile, partial: &Path) -> Result<BackupRecord, StoreError> {
        let mut timestamp_ms = Utc::now().timestamp_millis();
        let mut attempts = 0;
        loop {
            let record = BackupRecord::new(board.id.clone(), timestamp_ms, board.extension());
            let path = self.backup_dir.join(&record.file_name);
            match fs::hard_link(partial, &path).await {
                Ok(()) => return Ok(record),
                Err(err) if err.kind() == ErrorKind::AlreadyExists && attempts < MAX_NAME_ATTEMPTS => {
                    attempts += 1;
                    timestamp_ms += 1;
                }
                Err(source) => return Err(StoreError::CreateBackup { path, source }),
            }
        }
    }

    /// Removes staging files left behind by an interrupted process. Only safe
    /// while no cycle is running.
    pub async fn remove_stale_partials(&self) -> Result<usize> {
        let names = list_file_names(&self.backup_dir)
            .await
            .with_context(|| format!("list backup dir: {}", self.backup_dir.display()))?;
        let mut removed = 0;
        for name in names.iter().filter(|n| is_partial(n)) {
            let path = self.backup_dir.join(name);
            fs::remove_file(&path)
                .await
                .with_context(|| format!("remove stale snapshot: {}", path.display()))?;
            removed += 1;
        }
        if removed > 0 {
            warn!(removed, dir = %self.backup_dir.display(), "removed unfinished snapshots");
        }
        Ok(removed)
    }
}

fn is_partial(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)
}

async fn remove_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        if err.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "could not remove partial snapshot");
        }
    }
}

async fn copy_into(source: &mut File, dest: &mut File) -> io::Result<u64> {
    let copied = tokio::io::copy(source, dest).await?;
    dest.flush().await?;
    dest.sync_all().await?;
    Ok(copied)
}

async fn list_file_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!(file = ?raw, dir = %dir.display(), "skipping non utf-8 file name"),
        }
    }
    Ok(names)
}

#[async_trait::async_trait]
impl BackupStore for FsBackupStore {
    async fn list_boards(&self) -> Result<Vec<BoardFile>, StoreError> {
        let names = list_file_names(&self.board_dir)
            .await
            .map_err(|source| StoreError::ListBoards {
                path: self.board_dir.clone(),
                source,
            })?;

        let mut boards: Vec<BoardFile> = names.into_iter().filter_map(BoardFile::from_file_name).collect();
        boards.sort();
        boards.dedup_by(|later, kept| {
            let duplicate = later.id == kept.id;
            if duplicate {
                warn!(board = %kept.id, kept = %kept.file_name, ignored = %later.file_name, "duplicate board identifier");
            }
            duplicate
        });
        Ok(boards)
    }

    async fn list_backups(&self) -> Result<Vec<String>, StoreError> {
        let names = list_file_names(&self.backup_dir)
            .await
            .map_err(|source| StoreError::ListBackups {
                path: self.backup_dir.clone(),
                source,
            })?;
        Ok(names.into_iter().filter(|n| !is_partial(n)).collect())
    }

    async fn write_snapshot(&self, board: &BoardFile) -> Result<BackupRecord, StoreError> {
        let source_path = self.board_dir.join(&board.file_name);
        let mut board_file = File::open(&source_path)
            .await
            .map_err(|source| StoreError::OpenBoard {
                path: source_path.clone(),
                source,
            })?;

        let partial = self.partial_path(board);
        let mut dest = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial)
            .await
            .map_err(|source| StoreError::CreateBackup {
                path: partial.clone(),
                source,
            })?;

        let bytes = match copy_into(&mut board_file, &mut dest).await {
            Ok(bytes) => bytes,
            Err(source) => {
                drop(dest);
                remove_partial(&partial).await;
                return Err(StoreError::CopyBoard { path: partial, source });
            }
        };
        drop(dest);

        let published = self.publish(board, &partial).await;
        remove_partial(&partial).await;
        let record = published?;
        debug!(board = %board.id, file = %record.file_name, bytes, "snapshot written");
        Ok(record)
    }

    async fn delete_snapshot(&self, record: &BackupRecord) -> Result<DeleteOutcome, StoreError> {
        let path = self.backup_dir.join(&record.file_name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(DeleteOutcome::Removed),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(DeleteOutcome::AlreadyAbsent),
            Err(source) => Err(StoreError::RemoveBackup { path, source }),
        }
    }

    async fn read_backup(&self, file_name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let record = BackupRecord::parse(file_name)?;
        let path = self.backup_dir.join(&record.file_name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::ReadBackup { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(tmp: &tempfile::TempDir) -> FsBackupStore {
        let store = FsBackupStore::new(tmp.path().join("boards"), tmp.path().join("backups"));
        std::fs::create_dir_all(store.board_dir()).expect("board dir");
        std::fs::create_dir_all(store.backup_dir()).expect("backup dir");
        store
    }

    #[tokio::test]
    async fn list_boards_strips_extensions_and_skips_non_boards() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store(&tmp);
        std::fs::write(store.board_dir().join("board-a.json"), b"{}").expect("write");
        std::fs::write(store.board_dir().join("board-b.json"), b"{}").expect("write");
        std::fs::write(store.board_dir().join(".hidden"), b"").expect("write");
        std::fs::create_dir(store.board_dir().join("nested.json")).expect("dir");

        let boards = store.list_boards().await.expect("list");
        let ids: Vec<&str> = boards.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["board-a", "board-b"]);
    }

    #[tokio::test]
    async fn list_boards_fails_when_directory_is_missing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = FsBackupStore::new(tmp.path().join("nope"), tmp.path().join("backups"));
        let err = store.list_boards().await.unwrap_err();
        assert!(matches!(err, StoreError::ListBoards { .. }));
    }

    #[tokio::test]
    async fn write_snapshot_copies_board_bytes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store(&tmp);
        let payload = br#"{"item-1":{"tool":"Pencil"}}"#;
        std::fs::write(store.board_dir().join("board-a.json"), payload).expect("write");
        let board = BoardFile::from_file_name("board-a.json").expect("board");

        let before = Utc::now().timestamp_millis();
        let record = store.write_snapshot(&board).await.expect("snapshot");
        assert_eq!(record.board.as_str(), "board-a");
        assert!(record.timestamp_ms >= before);
        assert!(record.file_name.starts_with("board-a__"));
        assert!(record.file_name.ends_with(".json"));

        let copied = std::fs::read(store.backup_dir().join(&record.file_name)).expect("read");
        assert_eq!(copied, payload);
    }

    #[tokio::test]
    async fn write_snapshot_never_overwrites() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store(&tmp);
        std::fs::write(store.board_dir().join("board-a.json"), b"v1").expect("write");
        let board = BoardFile::from_file_name("board-a.json").expect("board");

        let first = store.write_snapshot(&board).await.expect("first");
        let second = store.write_snapshot(&board).await.expect("second");
        assert_ne!(first.file_name, second.file_name);
        assert_eq!(store.list_backups().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn write_snapshot_of_missing_board_fails_without_leftovers() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store(&tmp);
        let board = BoardFile::from_file_name("vanished.json").expect("board");

        let err = store.write_snapshot(&board).await.unwrap_err();
        assert!(matches!(err, StoreError::OpenBoard { .. }));
        assert!(store.list_backups().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn failed_copy_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store(&tmp);
        // opens fine but every read fails with EISDIR
        std::fs::create_dir(store.board_dir().join("board-a.json")).expect("dir");
        let board = BoardFile::from_file_name("board-a.json").expect("board");

        let err = store.write_snapshot(&board).await.unwrap_err();
        assert!(matches!(err, StoreError::CopyBoard { .. }));
        assert!(store.list_backups().await.expect("list").is_empty());
        let leftovers: Vec<_> = std::fs::read_dir(store.backup_dir()).expect("read dir").collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn unfinished_snapshots_are_not_backups() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store(&tmp);
        std::fs::write(store.backup_dir().join(".board-a.json.partial"), b"{\"trunc").expect("write");
        std::fs::write(store.backup_dir().join("board-a__5.json"), b"{}").expect("write");

        let names = store.list_backups().await.expect("list");
        assert_eq!(names, vec!["board-a__5.json".to_owned()]);

        assert_eq!(store.remove_stale_partials().await.expect("sweep"), 1);
        assert!(!store.backup_dir().join(".board-a.json.partial").exists());
        assert!(store.backup_dir().join("board-a__5.json").exists());
    }

    #[tokio::test]
    async fn history_files_do_not_become_boards() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store(&tmp);
        std::fs::write(store.board_dir().join("board-x.json"), b"{}").expect("write");
        std::fs::write(store.board_dir().join("board-x.json.1647275441964.bak"), b"{}").expect("write");

        let boards = store.list_boards().await.expect("list");
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].id.as_str(), "board-x");
        assert_eq!(boards[0].file_name, "board-x.json");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store(&tmp);
        let record = BackupRecord::parse("board-a__100.json").expect("parse");
        std::fs::write(store.backup_dir().join(&record.file_name), b"old").expect("write");

        assert_eq!(store.delete_snapshot(&record).await.expect("delete"), DeleteOutcome::Removed);
        assert_eq!(
            store.delete_snapshot(&record).await.expect("delete again"),
            DeleteOutcome::AlreadyAbsent
        );
        assert!(!store.backup_dir().join(&record.file_name).exists());
    }

    #[tokio::test]
    async fn read_backup_validates_names() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store(&tmp);
        std::fs::write(store.backup_dir().join("board-a__7.json"), b"seven").expect("write");

        let found = store.read_backup("board-a__7.json").await.expect("read");
        assert_eq!(found.as_deref(), Some(&b"seven"[..]));
        assert!(store.read_backup("board-a__8.json").await.expect("read").is_none());
        assert!(matches!(
            store.read_backup("../board-a__7.json").await,
            Err(StoreError::InvalidBackupName(_))
        ));
    }
}
