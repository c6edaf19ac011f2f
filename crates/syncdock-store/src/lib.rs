//! Filesystem layer for syncdock.
//!
//! This crate owns everything that touches disk on behalf of the lifecycle
//! controller: the `LocationSet` mapping symbolic roles to absolute paths,
//! `ensure_dir` for directory preparation with permission-mode correction,
//! and the `Database` storage backend with its exclusive lock, format marker,
//! tuning profile and reset.

pub mod database;
pub mod dirs;
pub mod layout;
pub mod locations;

pub use database::{reset_database, Database, DatabaseMeta, Tuning, AUTO_LARGE_THRESHOLD};
pub use dirs::ensure_dir;
pub use layout::{DatabaseLayout, DATABASE_FORMAT_VERSION};
pub use locations::{Location, LocationSet};

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

/// Replace `dest` with `content` through a synced temp file in `dir`.
pub(crate) fn write_atomic(dir: &Path, dest: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database at '{0}' is locked by another instance")]
    Locked(PathBuf),
    #[error("database format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("unreadable format marker at '{0}'")]
    BadFormatMarker(PathBuf),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("path is not absolute: {0}")]
    NotAbsolute(PathBuf),
    #[error("location '{0}' is derived and cannot be set directly")]
    NotABaseDir(Location),
    #[error("invalid record name: {0}")]
    InvalidRecordName(String),
}
