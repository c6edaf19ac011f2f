use crate::cert::Certificate;
use crate::events::EventLogger;
use crate::EngineError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use syncdock_schema::EngineConfig;
use syncdock_store::{Database, Tuning};

const ASSET_DIR_ENV: &str = "STGUIASSETS";
const PROFILER_ENV: &str = "STPROFILER";
const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Why an instance terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error,
    Restart,
    /// Any other code a host asked the instance to stop with.
    Other(i32),
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitStatus::Success => write!(f, "success"),
            ExitStatus::Error => write!(f, "error"),
            ExitStatus::Restart => write!(f, "restart"),
            ExitStatus::Other(code) => write!(f, "exit code {code}"),
        }
    }
}

/// Flags that decide how a missing or foreign config is treated at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigPolicy {
    /// Accept a config written by a newer version instead of failing.
    pub allow_newer: bool,
    /// Fail when no config exists instead of synthesizing a default one.
    pub no_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppOptions {
    pub asset_dir: Option<PathBuf>,
    pub profiler_url: Option<String>,
    pub no_upgrade: bool,
    pub verbose: bool,
    pub maintenance_interval: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            asset_dir: None,
            profiler_url: None,
            no_upgrade: true,
            verbose: false,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

impl AppOptions {
    /// Options for an embedded instance: upgrades are always off, the asset
    /// directory and profiler endpoint come from the environment.
    pub fn from_env(verbose: bool) -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            asset_dir: non_empty(ASSET_DIR_ENV).map(PathBuf::from),
            profiler_url: non_empty(PROFILER_ENV),
            verbose,
            ..Self::default()
        }
    }
}

/// Everything a successful bootstrap hands to the engine.
pub struct AppContext {
    pub config: EngineConfig,
    pub database: Database,
    pub certificate: Certificate,
    pub events: Arc<EventLogger>,
    pub options: AppOptions,
}

/// Control interface of one constructed engine instance.
pub trait EngineApp: Send + Sync {
    fn start(&self) -> Result<(), EngineError>;

    /// Ask the instance to terminate with `status`. Does not wait for it.
    /// Returns the status the instance will report, which is the first one
    /// requested if a stop was already under way.
    fn stop(&self, status: ExitStatus) -> ExitStatus;

    /// Block until the instance has terminated and all of its background
    /// services have been joined.
    fn wait(&self) -> ExitStatus;
}

/// The bootstrap stages and app construction of an engine.
///
/// The stage methods default to the built-in implementations; backends
/// override what they do differently.
pub trait EngineBackend: Send + Sync {
    fn name(&self) -> &str;

    fn load_or_generate_certificate(
        &self,
        cert_file: &Path,
        key_file: &Path,
    ) -> Result<Certificate, EngineError> {
        crate::cert::load_or_generate_certificate(cert_file, key_file)
    }

    fn load_config_at_startup(
        &self,
        path: &Path,
        cert: &Certificate,
        events: &EventLogger,
        policy: ConfigPolicy,
    ) -> Result<EngineConfig, EngineError> {
        crate::startup::load_config_at_startup(path, cert, events, policy)
    }

    fn open_database(&self, path: &Path, tuning: Tuning) -> Result<Database, EngineError> {
        Ok(Database::open(path, tuning)?)
    }

    fn new_app(&self, ctx: AppContext) -> Result<Arc<dyn EngineApp>, EngineError>;
}
