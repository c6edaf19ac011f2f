//! Identity and configuration schema for syncdock.
//!
//! This crate defines the data the rest of the workspace passes around:
//! the fixed-length `DeviceId` derived from a certificate, and the TOML
//! `EngineConfig` document with version detection, stepwise migration and
//! atomic persistence.

pub mod config;
pub mod identity;

pub use config::{
    archive_path, read_raw_config, DeviceSection, EngineConfig, FolderSection, GuiSection,
    OptionsSection, RawConfig, CURRENT_CONFIG_VERSION, DEFAULT_GUI_ADDRESS,
};
pub use identity::{DeviceId, DEVICE_ID_LEN};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeToml(#[from] toml::ser::Error),
    #[error("config has no valid 'version' field")]
    MissingVersion,
    #[error("config version {found} is newer than supported version {supported}")]
    NewerVersion { found: u32, supported: u32 },
    #[error("invalid device id '{0}'")]
    InvalidDeviceId(String),
}
