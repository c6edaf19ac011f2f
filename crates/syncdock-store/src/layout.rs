use crate::{write_atomic, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk format of the index database. A database written with another
/// number is refused rather than guessed at.
pub const DATABASE_FORMAT_VERSION: u32 = 1;

const MARKER_FILE: &str = "FORMAT";
const MARKER_TAG: &str = "syncdock-index";

/// Where the pieces of one database live below its directory.
///
/// Nothing is stored outside `root`, so a reset is one recursive delete.
#[derive(Debug, Clone)]
pub struct DatabaseLayout {
    root: PathBuf,
}

impl DatabaseLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// One file per record, named after the record.
    pub fn records_dir(&self) -> PathBuf {
        self.root.join("records")
    }

    pub fn meta_file(&self) -> PathBuf {
        self.root.join("meta.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join("LOCK")
    }

    /// Single line `syncdock-index <format>`.
    pub fn marker_file(&self) -> PathBuf {
        self.root.join(MARKER_FILE)
    }

    /// Create the record directory and stamp or check the format marker.
    pub fn prepare(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.records_dir())?;
        match self.format()? {
            Some(DATABASE_FORMAT_VERSION) => Ok(()),
            Some(found) => Err(StoreError::VersionMismatch {
                expected: DATABASE_FORMAT_VERSION,
                found,
            }),
            None => {
                let line = format!("{MARKER_TAG} {DATABASE_FORMAT_VERSION}\n");
                write_atomic(&self.root, &self.marker_file(), line.as_bytes())?;
                debug!(
                    "stamped {} with format {DATABASE_FORMAT_VERSION}",
                    self.root.display()
                );
                Ok(())
            }
        }
    }

    /// Format recorded in the marker, `None` for an unstamped directory.
    pub fn format(&self) -> Result<Option<u32>, StoreError> {
        let path = self.marker_file();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        content
            .trim_end()
            .strip_prefix(MARKER_TAG)
            .and_then(|rest| rest.strip_prefix(' '))
            .and_then(|n| n.parse().ok())
            .map(Some)
            .ok_or(StoreError::BadFormatMarker(path))
    }
}
