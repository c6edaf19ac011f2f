use crate::layout::DatabaseLayout;
use crate::{fsync_dir, write_atomic, StoreError};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Storage larger than this is opened with the `Large` profile under `Auto`.
pub const AUTO_LARGE_THRESHOLD: u64 = 200 << 20;

/// Resource profile the storage backend is opened with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tuning {
    #[default]
    Auto,
    Small,
    Large,
}

impl Tuning {
    /// Pick a concrete profile given the current on-disk size.
    pub fn resolve(self, current_size: u64) -> Tuning {
        match self {
            Tuning::Auto if current_size > AUTO_LARGE_THRESHOLD => Tuning::Large,
            Tuning::Auto => Tuning::Small,
            other => other,
        }
    }
}

impl std::fmt::Display for Tuning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tuning::Auto => write!(f, "auto"),
            Tuning::Small => write!(f, "small"),
            Tuning::Large => write!(f, "large"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseMeta {
    pub created_at: String,
    pub last_opened_at: String,
    pub open_count: u64,
    pub tuning: Tuning,
}

/// An open storage backend.
///
/// Holds an exclusive lock on the database directory until dropped, so two
/// instances can never share one database.
pub struct Database {
    layout: DatabaseLayout,
    meta: DatabaseMeta,
    lock_file: File,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("root", &self.layout.root())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl Database {
    pub fn open(path: &Path, tuning: Tuning) -> Result<Self, StoreError> {
        fs::create_dir_all(path)?;
        let layout = DatabaseLayout::new(path);

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(layout.lock_file())?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(path.to_path_buf()));
        }

        layout.prepare()?;

        let resolved = tuning.resolve(dir_size(path)?);
        let now = chrono::Utc::now().to_rfc3339();
        let meta = match read_meta(&layout)? {
            Some(mut meta) => {
                meta.open_count += 1;
                meta.last_opened_at = now;
                meta.tuning = resolved;
                meta
            }
            None => DatabaseMeta {
                created_at: now.clone(),
                last_opened_at: now,
                open_count: 1,
                tuning: resolved,
            },
        };
        let content = serde_json::to_vec_pretty(&meta)?;
        write_atomic(layout.root(), &layout.meta_file(), &content)?;

        info!(
            "opened database {} (tuning {resolved}, open #{})",
            path.display(),
            meta.open_count
        );
        Ok(Self {
            layout,
            meta,
            lock_file,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        self.layout.root()
    }

    #[inline]
    pub fn meta(&self) -> &DatabaseMeta {
        &self.meta
    }

    #[inline]
    pub fn tuning(&self) -> Tuning {
        self.meta.tuning
    }

    /// True when this open created the database.
    pub fn is_fresh(&self) -> bool {
        self.meta.open_count == 1
    }

    pub fn put_record(&self, name: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_record_name(name)?;
        let dir = self.layout.records_dir();
        write_atomic(&dir, &dir.join(name), value)
    }

    pub fn get_record(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_record_name(name)?;
        match fs::read(self.layout.records_dir().join(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn record_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.layout.records_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    if !name.starts_with('.') {
                        names.push(name.to_owned());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Flush directory metadata to disk.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        fsync_dir(&self.layout.records_dir())?;
        fsync_dir(self.layout.root())?;
        debug!("database checkpoint at {}", self.layout.root().display());
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// Remove the storage at `path` recursively. A missing location is not an error.
pub fn reset_database(path: &Path) -> Result<(), StoreError> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            info!("removed database {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn validate_record_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidRecordName(name.to_owned()))
    }
}

fn read_meta(layout: &DatabaseLayout) -> Result<Option<DatabaseMeta>, StoreError> {
    match fs::read_to_string(layout.meta_file()) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn dir_size(path: &Path) -> Result<u64, StoreError> {
    let mut total = 0;
    let mut pending: Vec<PathBuf> = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let ft = entry.file_type()?;
            if ft.is_dir() {
                pending.push(entry.path());
            } else if ft.is_file() {
                total += entry.metadata()?.len();
            }
        }
    }
    Ok(total)
}
