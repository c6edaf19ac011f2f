use crate::exit::ExitCode;
use crate::paths::apply_overrides;
use crate::CoreError;
use std::fmt;
use std::sync::Arc;
use syncdock_engine::{
    AppContext, AppOptions, ConfigPolicy, EngineApp, EngineBackend, EventLogger,
};
use syncdock_schema::{DeviceId, EngineConfig};
use syncdock_store::{ensure_dir, Location, LocationSet, Tuning};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Permission bits for directories the controller creates.
pub const DIR_MODE: u32 = 0o700;

const GUI_ADDRESS_ENV: &str = "STGUIADDRESS";
const GUI_API_KEY_ENV: &str = "STGUIAPIKEY";

/// Arguments of one start call, as the host passes them.
///
/// Empty strings mean "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub config_dir: String,
    pub data_dir: String,
    pub gui_address: String,
    pub gui_api_key: String,
    pub verbose: bool,
    pub allow_newer_config: bool,
    pub no_default_config: bool,
    pub ensure_config_dir_exists: bool,
    pub ensure_data_dir_exists: bool,
}

impl StartOptions {
    fn config_policy(&self) -> ConfigPolicy {
        ConfigPolicy {
            allow_newer: self.allow_newer_config,
            no_default: self.no_default_config,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Paths,
    Directories,
    Certificate,
    Config,
    Database,
    Engine,
}

impl Stage {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Stage::Paths => ExitCode::PathError,
            Stage::Directories | Stage::Database => ExitCode::StorageError,
            Stage::Certificate => ExitCode::CredentialError,
            Stage::Config => ExitCode::ConfigError,
            Stage::Engine => ExitCode::InternalError,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Paths => write!(f, "path resolution"),
            Stage::Directories => write!(f, "directory preparation"),
            Stage::Certificate => write!(f, "certificate"),
            Stage::Config => write!(f, "configuration"),
            Stage::Database => write!(f, "database"),
            Stage::Engine => write!(f, "engine construction"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: CoreError,
}

impl StageFailure {
    pub fn exit_code(&self) -> ExitCode {
        self.stage.exit_code()
    }
}

fn failed<E: Into<CoreError>>(stage: Stage) -> impl FnOnce(E) -> StageFailure {
    move |e| {
        let failure = StageFailure {
            stage,
            source: e.into(),
        };
        warn!("{failure}");
        failure
    }
}

/// Run the bootstrap stages in order, stopping at the first failure.
///
/// `locations` receives the resolved directory overrides; it is left
/// untouched when path resolution fails. `on_identity` is told the device id
/// as soon as a certificate is in hand, even if a later stage fails.
pub fn run(
    backend: &dyn EngineBackend,
    locations: &mut LocationSet,
    opts: &StartOptions,
    on_identity: impl FnOnce(DeviceId),
) -> Result<Arc<dyn EngineApp>, StageFailure> {
    apply_overrides(locations, &opts.config_dir, &opts.data_dir)
        .map_err(failed(Stage::Paths))?;
    debug!(
        "config dir {}, data dir {}",
        locations.config_base().display(),
        locations.data_base().display()
    );

    if opts.ensure_config_dir_exists {
        ensure_dir(locations.config_base(), DIR_MODE).map_err(failed(Stage::Directories))?;
    }
    if opts.ensure_data_dir_exists && !opts.data_dir.is_empty() {
        ensure_dir(locations.data_base(), DIR_MODE).map_err(failed(Stage::Directories))?;
    }

    let certificate = backend
        .load_or_generate_certificate(
            &locations.get(Location::CertFile),
            &locations.get(Location::KeyFile),
        )
        .map_err(failed(Stage::Certificate))?;
    on_identity(certificate.device_id());

    let events = Arc::new(EventLogger::new());
    let mut config = backend
        .load_config_at_startup(
            &locations.get(Location::ConfigFile),
            &certificate,
            &events,
            opts.config_policy(),
        )
        .map_err(failed(Stage::Config))?;
    apply_gui_overrides(&mut config, &opts.gui_address, &opts.gui_api_key);

    let database = backend
        .open_database(&locations.get(Location::Database), Tuning::Auto)
        .map_err(failed(Stage::Database))?;

    info!(
        "bootstrap complete for device {} using {} engine",
        certificate.device_id().short(),
        backend.name()
    );
    backend
        .new_app(AppContext {
            config,
            database,
            certificate,
            events,
            options: AppOptions::from_env(opts.verbose),
        })
        .map_err(failed(Stage::Engine))
}

/// Override the GUI address and API key of a loaded config.
///
/// A non-empty argument wins over its environment variable. Only the
/// in-memory document changes.
pub fn apply_gui_overrides(config: &mut EngineConfig, address: &str, api_key: &str) {
    if let Some(address) = non_empty_or_env(address, GUI_ADDRESS_ENV) {
        debug!("gui address overridden to {address}");
        config.gui.address = address;
    }
    if let Some(api_key) = non_empty_or_env(api_key, GUI_API_KEY_ENV) {
        debug!("gui api key overridden");
        config.gui.api_key = api_key;
    }
}

fn non_empty_or_env(value: &str, key: &str) -> Option<String> {
    non_empty_or(value, || std::env::var(key).ok())
}

/// `value` unless empty, else a non-empty `fallback`.
fn non_empty_or(value: &str, fallback: impl FnOnce() -> Option<String>) -> Option<String> {
    if value.is_empty() {
        fallback().filter(|v| !v.is_empty())
    } else {
        Some(value.to_owned())
    }
}
