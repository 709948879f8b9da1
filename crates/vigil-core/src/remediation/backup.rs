//! Reversible backups taken before a remediation touches a file.
//!
//! Layout: `<root>/<backup id>/manifest.json` and `<root>/<backup id>/content`.
//! The manifest carries the SHA-256 of the saved bytes; restoring refuses to
//! write anything back when the stored content no longer matches it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::handler::write_atomic;
use crate::error::BackupError;

const MANIFEST: &str = "manifest.json";
const CONTENT: &str = "content";

/// Metadata for one backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub target_path: PathBuf,
    /// `false` when the target did not exist; restoring then deletes it.
    pub existed: bool,
    /// Hex SHA-256 of the saved content.
    pub checksum: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Storage for pre-remediation backups.
pub trait BackupStore: Send + Sync {
    /// Save the current state of `target` and return the backup record.
    fn create(&self, target: &Path) -> Result<BackupRecord, BackupError>;

    fn get(&self, backup_id: &str) -> Result<BackupRecord, BackupError>;

    /// Put `target` back the way it was when the backup was taken.
    fn restore(&self, backup_id: &str) -> Result<BackupRecord, BackupError>;
}

/// Filesystem-backed backup store.
#[derive(Debug, Clone)]
pub struct FsBackupStore {
    root: PathBuf,
}

impl FsBackupStore {
    /// The root directory is created on first backup, not here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, backup_id: &str) -> Result<PathBuf, BackupError> {
        // Ids are generated uuids; anything else must not escape the root.
        Uuid::parse_str(backup_id).map_err(|_| BackupError::NotFound(backup_id.to_string()))?;
        Ok(self.root.join(backup_id))
    }
}

impl BackupStore for FsBackupStore {
    fn create(&self, target: &Path) -> Result<BackupRecord, BackupError> {
        let (existed, content) = match fs::read(target) {
            Ok(bytes) => (true, bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (false, Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let id = Uuid::new_v4().to_string();
        let dir = self.root.join(&id);
        fs::create_dir_all(&dir)?;

        let record = BackupRecord {
            id,
            target_path: target.to_path_buf(),
            existed,
            checksum: sha256_hex(&content),
            size: content.len() as u64,
            created_at: Utc::now(),
        };
        write_atomic(&dir.join(CONTENT), &content)?;
        write_atomic(&dir.join(MANIFEST), &serde_json::to_vec_pretty(&record)?)?;

        tracing::debug!(backup_id = %record.id, target = %target.display(), existed, "backup created");
        Ok(record)
    }

    fn get(&self, backup_id: &str) -> Result<BackupRecord, BackupError> {
        let manifest = self.dir(backup_id)?.join(MANIFEST);
        let raw = fs::read(&manifest).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackupError::NotFound(backup_id.to_string())
            } else {
                BackupError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn restore(&self, backup_id: &str) -> Result<BackupRecord, BackupError> {
        let record = self.get(backup_id)?;
        let content = fs::read(self.dir(backup_id)?.join(CONTENT))?;

        let actual = sha256_hex(&content);
        if actual != record.checksum {
            return Err(BackupError::ChecksumMismatch {
                expected: record.checksum.clone(),
                actual,
            });
        }

        if record.existed {
            write_atomic(&record.target_path, &content)?;
        } else {
            match fs::remove_file(&record.target_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(backup_id = %record.id, target = %record.target_path.display(), "backup restored");
        Ok(record)
    }
}
