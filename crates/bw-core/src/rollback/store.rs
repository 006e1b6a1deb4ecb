//! On-disk backup store.
//!
//! Layout, unchanged across tool versions:
//!
//! ```text
//! <backup_root>/<rollback_id>/metadata.json        point header + backup refs
//! <backup_root>/<rollback_id>/<kind>_<key>.backup  one entry per captured setting
//! ```
//!
//! Every metadata update is a full read-modify-write persisted via
//! write-to-temp-then-rename, so a killed process never leaves a
//! half-written document. Concurrent writers are NOT safe: the design
//! assumes one hardening operation per host at a time.

use super::entry::{BackupEntry, BackupKind};
use bw_common::{ErrorKind, RollbackId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Metadata file name inside each point directory.
pub const METADATA_FILENAME: &str = "metadata.json";

/// Errors from the rollback journal.
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("backup store unavailable at {path}: {source}")]
    StoreUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("rollback point not found: {0}")]
    NotFound(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error("probe failed: {0}")]
    ProbeFailed(String),
}

impl RollbackError {
    /// Failure kind for programmatic branching.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RollbackError::StoreUnavailable { .. } | RollbackError::Io { .. } => ErrorKind::Io,
            RollbackError::NotFound(_) => ErrorKind::NotFound,
            RollbackError::Corrupt { .. } => ErrorKind::Other,
            RollbackError::ProbeTimeout(_) => ErrorKind::ProbeTimeout,
            RollbackError::ProbeFailed(_) => ErrorKind::Other,
        }
    }
}

/// Environment captured when a point is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub macos_version: String,
    pub user: String,
    pub hostname: String,
}

/// Reference to one backup file inside a point's metadata.
///
/// The optional fields mirror the legacy shape: defaults refs carry
/// domain/key, system refs a setting name, service refs a service name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRef {
    pub file: PathBuf,

    #[serde(rename = "type")]
    pub kind: BackupKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl BackupRef {
    /// Build the ref for an entry stored at `file`.
    pub fn for_entry(entry: &BackupEntry, file: PathBuf) -> Self {
        let mut backup_ref = BackupRef {
            file,
            kind: entry.kind(),
            domain: None,
            key: None,
            setting_name: None,
            service_name: None,
        };
        match entry {
            BackupEntry::Defaults { domain, key, .. } => {
                backup_ref.domain = Some(domain.clone());
                backup_ref.key = Some(key.clone());
            }
            BackupEntry::System { setting_name, .. } => {
                backup_ref.setting_name = Some(setting_name.clone());
            }
            BackupEntry::Service { service_name, .. } => {
                backup_ref.service_name = Some(service_name.clone());
            }
        }
        backup_ref
    }

    /// The key naming this ref in reports.
    pub fn identifying_key(&self) -> String {
        match self.kind {
            BackupKind::Defaults => format!(
                "{}.{}",
                self.domain.as_deref().unwrap_or("?"),
                self.key.as_deref().unwrap_or("?")
            ),
            BackupKind::System => self.setting_name.clone().unwrap_or_else(|| "?".into()),
            BackupKind::Service => self.service_name.clone().unwrap_or_else(|| "?".into()),
        }
    }
}

/// One rollback point's metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackPoint {
    pub rollback_id: String,
    pub component: String,
    pub description: String,
    /// Second-resolution timestamp embedded in the id.
    pub timestamp: String,
    pub created_at: String,
    pub system_info: SystemInfo,
    /// Insertion order is capture order; restore consumes it in reverse.
    #[serde(default)]
    pub backups: Vec<BackupRef>,
}

/// Filesystem access for rollback points.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the backup root. The one failure in this subsystem that
    /// propagates to the caller as-is: without a root nothing else works.
    pub fn ensure_root(&self) -> Result<(), RollbackError> {
        fs::create_dir_all(&self.root).map_err(|e| RollbackError::StoreUnavailable {
            path: self.root.clone(),
            source: e,
        })
    }

    pub fn point_dir(&self, id: &RollbackId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn metadata_path(&self, id: &RollbackId) -> PathBuf {
        self.point_dir(id).join(METADATA_FILENAME)
    }

    /// Create the point directory and persist its initial metadata.
    pub fn init_point(&self, id: &RollbackId, point: &RollbackPoint) -> Result<(), RollbackError> {
        let dir = self.point_dir(id);
        fs::create_dir_all(&dir).map_err(|e| RollbackError::StoreUnavailable {
            path: dir.clone(),
            source: e,
        })?;
        write_json_atomic(&self.metadata_path(id), point)
    }

    /// Load a point's metadata.
    pub fn load_point(&self, id: &RollbackId) -> Result<RollbackPoint, RollbackError> {
        let path = self.metadata_path(id);
        if !path.exists() {
            return Err(RollbackError::NotFound(id.to_string()));
        }
        read_json(&path)
    }

    /// Write one backup entry file; returns the path written.
    pub fn write_entry(
        &self,
        id: &RollbackId,
        entry: &BackupEntry,
    ) -> Result<PathBuf, RollbackError> {
        let path = self
            .point_dir(id)
            .join(format!("{}.backup", entry.file_stem()));
        write_json_atomic(&path, entry)?;
        Ok(path)
    }

    /// Load one backup entry file.
    pub fn load_entry(&self, path: &Path) -> Result<BackupEntry, RollbackError> {
        if !path.exists() {
            return Err(RollbackError::NotFound(path.display().to_string()));
        }
        read_json(path)
    }

    /// Append a backup ref to the point's metadata.
    ///
    /// Read-modify-write of the whole document; each call appends, never
    /// overwrites prior entries.
    pub fn append_ref(&self, id: &RollbackId, backup_ref: BackupRef) -> Result<(), RollbackError> {
        let mut point = self.load_point(id)?;
        point.backups.push(backup_ref);
        write_json_atomic(&self.metadata_path(id), &point)
    }

    /// All readable points, newest first by `created_at`.
    ///
    /// Unreadable or corrupt points are skipped with a warning rather than
    /// failing the listing.
    pub fn list_points(&self) -> Vec<RollbackPoint> {
        let mut points = Vec::new();
        let Ok(entries) = fs::read_dir(&self.root) else {
            return points;
        };
        for dir_entry in entries.flatten() {
            let metadata_path = dir_entry.path().join(METADATA_FILENAME);
            if !metadata_path.is_file() {
                continue;
            }
            match read_json::<RollbackPoint>(&metadata_path) {
                Ok(point) => points.push(point),
                Err(e) => {
                    warn!(path = %metadata_path.display(), error = %e, "skipping unreadable rollback point");
                }
            }
        }
        points.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        points
    }

    /// Remove a point directory and everything in it.
    pub fn remove_point(&self, id: &RollbackId) -> Result<(), RollbackError> {
        let dir = self.point_dir(id);
        fs::remove_dir_all(&dir).map_err(|e| RollbackError::Io {
            path: dir.clone(),
            source: e,
        })
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, RollbackError> {
    let content = fs::read_to_string(path).map_err(|e| RollbackError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| RollbackError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write a JSON document via temp-file-then-rename in the same directory.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), RollbackError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| RollbackError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json.as_bytes()).map_err(|e| RollbackError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    fs::rename(&tmp, path).map_err(|e| RollbackError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(path = %path.display(), "wrote record");
    Ok(())
}
