//! The synchronization engine as seen from the lifecycle controller.
//!
//! The engine proper is an external collaborator. This crate defines the
//! seam the controller drives it through (`EngineBackend` for the bootstrap
//! stages, `EngineApp` for run/stop/wait), and ships what every engine needs
//! from the host side: certificate load-or-generate, configuration loading at
//! startup, the event logger and a supervised service group scoped to one
//! instance. `LocalBackend` is the built-in reference engine; `MockBackend`
//! scripts failures for tests.

pub mod backend;
pub mod cert;
pub mod events;
pub mod local;
pub mod mock;
pub mod services;
pub mod startup;

pub use backend::{AppContext, AppOptions, ConfigPolicy, EngineApp, EngineBackend, ExitStatus};
pub use cert::{load_or_generate_certificate, Certificate, DEFAULT_COMMON_NAME};
pub use events::{Event, EventLogger};
pub use local::{LocalApp, LocalBackend};
pub use mock::{MockBackend, MockStage};
pub use services::{ServiceGroup, ShutdownSignal};
pub use startup::load_config_at_startup;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] syncdock_store::StoreError),
    #[error("config error: {0}")]
    Schema(#[from] syncdock_schema::SchemaError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid credentials: {0}")]
    Credential(String),
    #[error("config unavailable: {0}")]
    Config(String),
    #[error("instance already started")]
    AlreadyStarted,
    #[error("failed to spawn service '{name}': {reason}")]
    Spawn { name: String, reason: String },
    #[error("service '{name}' failed: {reason}")]
    Service { name: String, reason: String },
}
