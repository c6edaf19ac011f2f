//! Lifecycle control of an embedded synchronization engine.
//!
//! A host drives one engine instance per process through the [`Controller`]:
//! `start` resolves directories, runs the bootstrap stages and then blocks
//! until the instance terminates; `stop` from another thread signals it. All
//! outcomes are reported as a stable [`ExitCode`]. The [`logbridge`] module
//! forwards everything the engine logs to a host-registered sink.

pub mod bootstrap;
pub mod controller;
pub mod exit;
pub mod lifecycle;
pub mod logbridge;
pub mod paths;
pub mod registry;
pub mod version;

pub use bootstrap::{apply_gui_overrides, Stage, StageFailure, StartOptions, DIR_MODE};
pub use controller::Controller;
pub use exit::ExitCode;
pub use lifecycle::{validate_transition, InstanceState};
pub use logbridge::{CallbackLayer, LogSink, Severity};
pub use paths::{apply_overrides, resolve_dir};
pub use registry::{InstanceRegistry, StartTicket};
pub use version::{long_version, version};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("engine error: {0}")]
    Engine(#[from] syncdock_engine::EngineError),
    #[error("store error: {0}")]
    Store(#[from] syncdock_store::StoreError),
    #[error("cannot resolve '{path}': {reason}")]
    Path { path: String, reason: String },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: InstanceState,
        to: InstanceState,
    },
    #[error("logging bridge: {0}")]
    Logging(String),
}
