use crate::bootstrap::{self, StartOptions};
use crate::exit::ExitCode;
use crate::lifecycle::InstanceState;
use crate::registry::InstanceRegistry;
use crate::version::long_version;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use syncdock_engine::{EngineBackend, ExitStatus, LocalBackend};
use syncdock_schema::DeviceId;
use syncdock_store::{reset_database, Location, LocationSet};
use tracing::{debug, error, info, warn};

static GLOBAL: OnceLock<Controller> = OnceLock::new();

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Starts, stops and inspects the one engine instance of a process.
///
/// `start` blocks its caller for the lifetime of the instance; every other
/// method returns promptly and may be called from any thread meanwhile.
pub struct Controller {
    backend: Arc<dyn EngineBackend>,
    registry: InstanceRegistry,
    locations: Mutex<LocationSet>,
    identity: Mutex<DeviceId>,
}

impl Controller {
    /// A controller using the per-user default locations.
    pub fn new(backend: Arc<dyn EngineBackend>) -> Self {
        Self::with_locations(backend, LocationSet::from_env())
    }

    pub fn with_locations(backend: Arc<dyn EngineBackend>, locations: LocationSet) -> Self {
        Self {
            backend,
            registry: InstanceRegistry::new(),
            locations: Mutex::new(locations),
            identity: Mutex::new(DeviceId::EMPTY),
        }
    }

    /// The process-wide controller, driving the built-in engine.
    pub fn global() -> &'static Controller {
        GLOBAL.get_or_init(|| Controller::new(Arc::new(LocalBackend::new())))
    }

    /// Bootstrap and run an instance, blocking until it terminates.
    ///
    /// Returns `AlreadyRunning` without touching anything if an instance
    /// exists or is being started or stopped. A failed stage returns its own
    /// code and leaves the controller idle.
    pub fn start(&self, opts: &StartOptions) -> ExitCode {
        let Some(ticket) = self.registry.try_begin() else {
            debug!("start rejected: instance is {}", self.registry.state());
            return ExitCode::AlreadyRunning;
        };

        let mut locations = self.locations();
        let outcome = bootstrap::run(self.backend.as_ref(), &mut locations, opts, |id| {
            *lock(&self.identity) = id;
        });
        *lock(&self.locations) = locations;
        let app = match outcome {
            Ok(app) => app,
            Err(failure) => return failure.exit_code(),
        };

        if let Err(e) = ticket.publish(Arc::clone(&app)) {
            error!("cannot publish instance: {e}");
            app.stop(ExitStatus::Error);
            app.wait();
            return ExitCode::InternalError;
        }
        if let Err(e) = app.start() {
            warn!("engine failed to start: {e}");
            app.stop(ExitStatus::Error);
            app.wait();
            return ExitCode::InternalError;
        }

        let status = app.wait();
        info!("instance terminated: {status}");
        drop(ticket);
        ExitCode::from(status)
    }

    /// Ask the running instance to terminate with `code`.
    ///
    /// Returns `Success` once the request is delivered, without waiting for
    /// termination, or `NotRunning` if there is nothing to signal. A code
    /// that is not a stop code is refused with `InternalError` and nothing
    /// is signalled.
    pub fn stop(&self, code: ExitCode) -> ExitCode {
        if !code.is_stop_code() {
            warn!("stop refused: {code} is reserved");
            return ExitCode::InternalError;
        }
        match self.registry.signal_stop(code.to_status()) {
            Some(effective) => {
                info!("stop requested ({code}), instance will exit with {effective}");
                ExitCode::Success
            }
            None => {
                debug!("stop ignored: instance is {}", self.registry.state());
                ExitCode::NotRunning
            }
        }
    }

    pub fn state(&self) -> InstanceState {
        self.registry.state()
    }

    /// Delete the storage backend at its current location.
    ///
    /// Only allowed while idle; a start cannot begin until removal is done.
    pub fn reset_database(&self) -> ExitCode {
        let outcome = self.registry.while_idle(|| {
            let path = lock(&self.locations).get(Location::Database);
            info!("resetting database at {}", path.display());
            reset_database(&path)
        });
        match outcome {
            None => {
                warn!("database reset refused: instance is {}", self.state());
                ExitCode::AlreadyRunning
            }
            Some(Ok(())) => ExitCode::Success,
            Some(Err(e)) => {
                warn!("database reset failed: {e}");
                ExitCode::StorageError
            }
        }
    }

    /// Identity from the last certificate loaded, or [`DeviceId::EMPTY`].
    pub fn own_device_id(&self) -> DeviceId {
        *lock(&self.identity)
    }

    pub fn locations(&self) -> LocationSet {
        lock(&self.locations).clone()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn long_version(&self) -> String {
        long_version(self.backend_name())
    }
}
