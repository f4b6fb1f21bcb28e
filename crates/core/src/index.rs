use std::collections::BTreeMap;

use tracing::warn;

use crate::board::{BackupRecord, BoardId};

/// Backups grouped per active board, newest first.
///
/// Rebuilt from a directory listing every cycle; listing order is never
/// trusted, each board's records are sorted explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupIndex {
    boards: BTreeMap<BoardId, Vec<BackupRecord>>,
}

impl BackupIndex {
    /// Builds the index from raw backup file names. Every active board gets an
    /// entry, possibly empty. Malformed names and backups of boards that are
    /// not active are left out with a warning.
    pub fn build<N, S>(backup_names: N, active: impl IntoIterator<Item = BoardId>) -> Self
    where
        N: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut boards: BTreeMap<BoardId, Vec<BackupRecord>> =
            active.into_iter().map(|id| (id, Vec::new())).collect();

        for name in backup_names {
            let name = name.as_ref();
            let record = match BackupRecord::parse(name) {
                Ok(record) => record,
                Err(err) => {
                    warn!(event = "backup-name-malformed", file = name, error = %err, "ignoring backup file");
                    continue;
                }
            };
            match boards.get_mut(&record.board) {
                Some(records) => records.push(record),
                None => {
                    warn!(event = "backup-orphaned", file = name, board = %record.board, "backup has no active board")
                }
            }
        }

        for records in boards.values_mut() {
            records.sort_by(|a, b| {
                b.timestamp_ms
                    .cmp(&a.timestamp_ms)
                    .then_with(|| a.file_name.cmp(&b.file_name))
            });
        }

        Self { boards }
    }

    pub fn boards(&self) -> impl Iterator<Item = (&BoardId, &[BackupRecord])> {
        self.boards.iter().map(|(id, records)| (id, records.as_slice()))
    }

    pub fn backups(&self, board: &str) -> Option<&[BackupRecord]> {
        self.boards.get(board).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }
}
