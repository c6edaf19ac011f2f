use crate::identity::DeviceId;
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Version written by this build. Older documents are migrated step by step.
pub const CURRENT_CONFIG_VERSION: u32 = 3;
pub const DEFAULT_GUI_ADDRESS: &str = "127.0.0.1:8384";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EngineConfig {
    pub version: u32,
    pub device: DeviceSection,
    #[serde(default)]
    pub gui: GuiSection,
    #[serde(default)]
    pub options: OptionsSection,
    #[serde(default, rename = "folder", skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<FolderSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DeviceSection {
    pub id: DeviceId,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GuiSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_gui_address")]
    pub address: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub use_tls: bool,
}

impl Default for GuiSection {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_gui_address(),
            api_key: String::new(),
            use_tls: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OptionsSection {
    #[serde(default = "default_listen_addresses")]
    pub listen_addresses: Vec<String>,
    #[serde(default = "default_true")]
    pub global_announce: bool,
    #[serde(default = "default_true")]
    pub local_announce: bool,
    #[serde(default = "default_true")]
    pub relays_enabled: bool,
    /// Hours between upgrade checks. Zero disables upgrades.
    #[serde(default)]
    pub auto_upgrade_interval_h: u32,
}

impl Default for OptionsSection {
    fn default() -> Self {
        Self {
            listen_addresses: default_listen_addresses(),
            global_announce: true,
            local_announce: true,
            relays_enabled: true,
            auto_upgrade_interval_h: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FolderSection {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub path: String,
    #[serde(default)]
    pub paused: bool,
}

fn default_true() -> bool {
    true
}

fn default_gui_address() -> String {
    DEFAULT_GUI_ADDRESS.to_owned()
}

fn default_listen_addresses() -> Vec<String> {
    vec!["default".to_owned()]
}

impl EngineConfig {
    /// A fresh document for a device that has never been configured.
    pub fn new_default(device_id: DeviceId, device_name: &str, api_key: &str) -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            device: DeviceSection {
                id: device_id,
                name: device_name.to_owned(),
            },
            gui: GuiSection {
                api_key: api_key.to_owned(),
                ..GuiSection::default()
            },
            options: OptionsSection::default(),
            folders: Vec::new(),
        }
    }

    pub fn to_toml(&self) -> Result<String, SchemaError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the document atomically: temp file in the same directory,
    /// fsync, rename, fsync the directory.
    pub fn save(&self, path: &Path) -> Result<(), SchemaError> {
        let content = self.to_toml()?;
        let dir = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| SchemaError::Io(e.error))?;
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }
}

/// Path an outdated config is archived to before it is rewritten.
pub fn archive_path(path: &Path, version: u32) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(format!(".v{version}"));
    path.with_file_name(name)
}

/// A config document whose version has been read but which has not yet
/// been migrated or deserialized.
#[derive(Debug, Clone)]
pub struct RawConfig {
    table: toml::Table,
    version: u32,
}

pub fn read_raw_config(path: &Path) -> Result<RawConfig, SchemaError> {
    let content = fs::read_to_string(path)?;
    RawConfig::parse(&content)
}

impl RawConfig {
    pub fn parse(content: &str) -> Result<Self, SchemaError> {
        let table: toml::Table = content.parse()?;
        let version = table
            .get("version")
            .and_then(toml::Value::as_integer)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .ok_or(SchemaError::MissingVersion)?;
        Ok(Self { table, version })
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_newer(&self) -> bool {
        self.version > CURRENT_CONFIG_VERSION
    }

    pub fn needs_migration(&self) -> bool {
        self.version < CURRENT_CONFIG_VERSION
    }

    /// Deserialize the document, refusing versions newer than this build.
    pub fn into_config(self) -> Result<EngineConfig, SchemaError> {
        if self.is_newer() {
            return Err(SchemaError::NewerVersion {
                found: self.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }
        self.into_config_lenient()
    }

    /// Deserialize the document, migrating older versions. Newer versions are
    /// read as-is; fields this build does not know are dropped.
    pub fn into_config_lenient(mut self) -> Result<EngineConfig, SchemaError> {
        if self.needs_migration() {
            for from in self.version..CURRENT_CONFIG_VERSION {
                migrate_step(&mut self.table, from);
            }
            self.table.insert(
                "version".to_owned(),
                toml::Value::Integer(i64::from(CURRENT_CONFIG_VERSION)),
            );
        }
        Ok(toml::Value::Table(self.table).try_into()?)
    }
}

fn migrate_step(table: &mut toml::Table, from: u32) {
    match from {
        // v1 spelled the GUI key `apikey`.
        1 => {
            if let Some(toml::Value::Table(gui)) = table.get_mut("gui") {
                if let Some(key) = gui.remove("apikey") {
                    gui.entry("api_key").or_insert(key);
                }
            }
        }
        // v2 had a single `listen_address` string.
        2 => {
            if let Some(toml::Value::Table(options)) = table.get_mut("options") {
                if let Some(toml::Value::String(addr)) = options.remove("listen_address") {
                    options
                        .entry("listen_addresses")
                        .or_insert_with(|| toml::Value::Array(vec![toml::Value::String(addr)]));
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceId {
        DeviceId::from_certificate_body(b"config tests")
    }

    #[test]
    fn default_config_roundtrips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = EngineConfig::new_default(device(), "laptop", "key123");
        cfg.save(&path).unwrap();

        let raw = read_raw_config(&path).unwrap();
        assert_eq!(raw.version(), CURRENT_CONFIG_VERSION);
        let loaded = raw.into_config().unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.gui.address, DEFAULT_GUI_ADDRESS);
    }

    #[test]
    fn missing_version_is_rejected() {
        let err = RawConfig::parse("[device]\nname = \"x\"\n").unwrap_err();
        assert!(matches!(err, SchemaError::MissingVersion));
    }

    #[test]
    fn newer_version_requires_lenient_read() {
        let doc = format!(
            "version = {}\n[device]\nid = \"{}\"\nname = \"n\"\n[future]\nthing = 1\n",
            CURRENT_CONFIG_VERSION + 1,
            device()
        );
        let raw = RawConfig::parse(&doc).unwrap();
        assert!(raw.is_newer());
        assert!(matches!(
            raw.clone().into_config(),
            Err(SchemaError::NewerVersion { .. })
        ));
        let cfg = raw.into_config_lenient().unwrap();
        assert_eq!(cfg.version, CURRENT_CONFIG_VERSION + 1);
        assert_eq!(cfg.device.id, device());
    }

    #[test]
    fn v1_document_is_migrated() {
        let doc = format!(
            r#"version = 1
[device]
id = "{}"
name = "old"
[gui]
apikey = "legacy"
[options]
listen_address = "tcp://0.0.0.0:22000"
"#,
            device()
        );
        let raw = RawConfig::parse(&doc).unwrap();
        assert!(raw.needs_migration());
        let cfg = raw.into_config().unwrap();
        assert_eq!(cfg.version, CURRENT_CONFIG_VERSION);
        assert_eq!(cfg.gui.api_key, "legacy");
        assert_eq!(cfg.options.listen_addresses, vec!["tcp://0.0.0.0:22000"]);
    }

    #[test]
    fn folders_are_kept() {
        let mut cfg = EngineConfig::new_default(device(), "n", "k");
        cfg.folders.push(FolderSection {
            id: "default".to_owned(),
            label: "Default Folder".to_owned(),
            path: "/srv/sync".to_owned(),
            paused: false,
        });
        let text = cfg.to_toml().unwrap();
        assert!(text.contains("[[folder]]"));
        let back = RawConfig::parse(&text).unwrap().into_config().unwrap();
        assert_eq!(back.folders.len(), 1);
    }

    #[test]
    fn archive_path_appends_version() {
        let p = archive_path(Path::new("/cfg/config.toml"), 2);
        assert_eq!(p, PathBuf::from("/cfg/config.toml.v2"));
    }
}
