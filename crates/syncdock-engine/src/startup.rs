use crate::backend::ConfigPolicy;
use crate::cert::Certificate;
use crate::events::{Event, EventLogger};
use crate::EngineError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fs;
use std::path::Path;
use syncdock_schema::{archive_path, read_raw_config, EngineConfig, CURRENT_CONFIG_VERSION};
use tracing::{info, warn};

const API_KEY_LEN: usize = 32;
const FALLBACK_DEVICE_NAME: &str = "syncdock";

/// Load the engine configuration for the device identified by `cert`.
///
/// - Missing file: synthesize and save a default, unless `policy.no_default`.
/// - Newer version: fail, unless `policy.allow_newer`.
/// - Older version: archive the original next to it, migrate, save.
/// - A document written for another device is re-keyed to this one.
pub fn load_config_at_startup(
    path: &Path,
    cert: &Certificate,
    events: &EventLogger,
    policy: ConfigPolicy,
) -> Result<EngineConfig, EngineError> {
    let device_id = cert.device_id();

    if !path.exists() {
        if policy.no_default {
            return Err(EngineError::Config(format!(
                "{} does not exist and default generation is disabled",
                path.display()
            )));
        }
        let cfg = EngineConfig::new_default(device_id, &default_device_name(), &generate_api_key());
        cfg.save(path)?;
        info!("default config saved to {}", path.display());
        events.log(Event::ConfigSaved {
            path: path.to_path_buf(),
        });
        return Ok(cfg);
    }

    let raw = read_raw_config(path)?;
    let version = raw.version();
    let mut cfg = if raw.is_newer() {
        if !policy.allow_newer {
            return Err(EngineError::Config(format!(
                "config version {version} is newer than supported version {CURRENT_CONFIG_VERSION}"
            )));
        }
        warn!("config version {version} is newer than supported version {CURRENT_CONFIG_VERSION}, continuing");
        raw.into_config_lenient()?
    } else if raw.needs_migration() {
        let archive = archive_path(path, version);
        fs::copy(path, &archive)?;
        let cfg = raw.into_config()?;
        cfg.save(path)?;
        info!(
            "migrated config from version {version} to {CURRENT_CONFIG_VERSION}, original kept at {}",
            archive.display()
        );
        events.log(Event::ConfigMigrated {
            from: version,
            to: CURRENT_CONFIG_VERSION,
        });
        cfg
    } else {
        raw.into_config()?
    };

    if cfg.device.id != device_id {
        warn!(
            "config at {} belongs to device {}, re-keying to {}",
            path.display(),
            cfg.device.id,
            device_id
        );
        cfg.device.id = device_id;
        cfg.save(path)?;
        events.log(Event::ConfigSaved {
            path: path.to_path_buf(),
        });
    }

    Ok(cfg)
}

fn generate_api_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LEN)
        .map(char::from)
        .collect()
}

fn default_device_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_DEVICE_NAME.to_owned())
}
