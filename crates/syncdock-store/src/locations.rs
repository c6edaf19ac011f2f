use crate::StoreError;
use std::fmt;
use std::path::{Path, PathBuf};

const CERT_FILE: &str = "cert.json";
const KEY_FILE: &str = "key.json";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_DIR: &str = "index-v1.db";

/// Symbolic role of a filesystem location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    ConfigBaseDir,
    DataBaseDir,
    CertFile,
    KeyFile,
    ConfigFile,
    Database,
}

impl Location {
    pub const ALL: [Location; 6] = [
        Location::ConfigBaseDir,
        Location::DataBaseDir,
        Location::CertFile,
        Location::KeyFile,
        Location::ConfigFile,
        Location::Database,
    ];

    /// Base directories are set explicitly; every other role is derived from one.
    pub fn is_base_dir(self) -> bool {
        matches!(self, Location::ConfigBaseDir | Location::DataBaseDir)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::ConfigBaseDir => write!(f, "ConfigBaseDir"),
            Location::DataBaseDir => write!(f, "DataBaseDir"),
            Location::CertFile => write!(f, "CertFile"),
            Location::KeyFile => write!(f, "KeyFile"),
            Location::ConfigFile => write!(f, "ConfigFile"),
            Location::Database => write!(f, "Database"),
        }
    }
}

/// Mapping from [`Location`] roles to absolute paths.
///
/// Only the two base directories are stored; files live at fixed names
/// beneath them, so changing a base dir moves everything derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSet {
    config_base: PathBuf,
    data_base: PathBuf,
}

impl Default for LocationSet {
    fn default() -> Self {
        Self::from_env()
    }
}

impl LocationSet {
    pub fn new(config_base: impl Into<PathBuf>, data_base: impl Into<PathBuf>) -> Self {
        Self {
            config_base: config_base.into(),
            data_base: data_base.into(),
        }
    }

    /// Per-user defaults under `$HOME`, or under `/tmp/syncdock` without one.
    pub fn from_env() -> Self {
        match std::env::var_os("HOME") {
            Some(home) if !home.is_empty() => {
                let home = PathBuf::from(home);
                Self::new(
                    home.join(".config/syncdock"),
                    home.join(".local/share/syncdock"),
                )
            }
            _ => Self::new("/tmp/syncdock/config", "/tmp/syncdock/data"),
        }
    }

    pub fn set_base_dir(&mut self, location: Location, path: &Path) -> Result<(), StoreError> {
        if !location.is_base_dir() {
            return Err(StoreError::NotABaseDir(location));
        }
        if !path.is_absolute() {
            return Err(StoreError::NotAbsolute(path.to_path_buf()));
        }
        match location {
            Location::ConfigBaseDir => self.config_base = path.to_path_buf(),
            _ => self.data_base = path.to_path_buf(),
        }
        Ok(())
    }

    #[inline]
    pub fn config_base(&self) -> &Path {
        &self.config_base
    }

    #[inline]
    pub fn data_base(&self) -> &Path {
        &self.data_base
    }

    pub fn get(&self, location: Location) -> PathBuf {
        match location {
            Location::ConfigBaseDir => self.config_base.clone(),
            Location::DataBaseDir => self.data_base.clone(),
            Location::CertFile => self.config_base.join(CERT_FILE),
            Location::KeyFile => self.config_base.join(KEY_FILE),
            Location::ConfigFile => self.config_base.join(CONFIG_FILE),
            Location::Database => self.data_base.join(DATABASE_DIR),
        }
    }
}
