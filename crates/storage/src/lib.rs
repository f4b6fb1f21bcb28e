mod engine;
pub mod error;
pub mod fs_store;
pub mod store;

pub use engine::BackupEngine;
pub use error::StoreError;
pub use fs_store::FsBackupStore;
pub use store::{BackupStore, DeleteOutcome};
