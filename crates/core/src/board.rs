use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved separator between the board identifier and the timestamp in a
/// backup file name.
pub const BACKUP_SEPARATOR: &str = "__";

/// Identifier of an active board: its file name up to the first `.`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(String);

impl BoardId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for BoardId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A board file as found in the board store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BoardFile {
    pub id: BoardId,
    pub file_name: String,
}

impl BoardFile {
    /// Returns `None` for names that cannot be boards (empty or hidden files).
    ///
    /// Board names never contain dots, so history files such as
    /// `board-x.json.1647275441964.bak` map to the same identifier as
    /// `board-x.json`.
    pub fn from_file_name(file_name: impl Into<String>) -> Option<Self> {
        let file_name = file_name.into();
        if file_name.is_empty() || file_name.starts_with('.') {
            return None;
        }
        let stem = match file_name.split_once('.') {
            Some((stem, _)) => stem,
            None => file_name.as_str(),
        };
        Some(Self {
            id: BoardId::new(stem),
            file_name,
        })
    }

    pub fn extension(&self) -> Option<&str> {
        self.file_name.split_once('.').map(|(_, ext)| ext)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackupNameError {
    #[error("{0:?} is not a plain file name")]
    NotAFileName(String),
    #[error("{0:?} has no `__` separator")]
    MissingSeparator(String),
    #[error("{0:?} has an empty board identifier")]
    EmptyBoard(String),
    #[error("{name:?} has an invalid timestamp {raw:?}")]
    InvalidTimestamp { name: String, raw: String },
}

/// One backup file: `<boardId>__<timestampMillis>[.<ext>]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BackupRecord {
    pub board: BoardId,
    pub timestamp_ms: i64,
    pub file_name: String,
}

impl BackupRecord {
    pub fn new(board: BoardId, timestamp_ms: i64, extension: Option<&str>) -> Self {
        let file_name = match extension {
            Some(ext) => format!("{board}{BACKUP_SEPARATOR}{timestamp_ms}.{ext}"),
            None => format!("{board}{BACKUP_SEPARATOR}{timestamp_ms}"),
        };
        Self {
            board,
            timestamp_ms,
            file_name,
        }
    }

    /// Parses a backup file name, splitting on the last separator so board
    /// identifiers may themselves contain `__`.
    pub fn parse(file_name: &str) -> Result<Self, BackupNameError> {
        if file_name.contains(|c: char| c == '/' || c == '\\') || file_name.starts_with('.') {
            return Err(BackupNameError::NotAFileName(file_name.to_owned()));
        }
        let (board, rest) = file_name
            .rsplit_once(BACKUP_SEPARATOR)
            .ok_or_else(|| BackupNameError::MissingSeparator(file_name.to_owned()))?;
        if board.is_empty() {
            return Err(BackupNameError::EmptyBoard(file_name.to_owned()));
        }

        let raw = rest.split_once('.').map_or(rest, |(ts, _)| ts);
        let invalid = || BackupNameError::InvalidTimestamp {
            name: file_name.to_owned(),
            raw: raw.to_owned(),
        };
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let timestamp_ms = raw.parse::<i64>().map_err(|_| invalid())?;

        Ok(Self {
            board: BoardId::new(board),
            timestamp_ms,
            file_name: file_name.to_owned(),
        })
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}
