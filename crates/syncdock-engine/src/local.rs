use crate::backend::{AppContext, AppOptions, EngineApp, EngineBackend, ExitStatus};
use crate::events::{Event, EventLogger};
use crate::services::{ServiceGroup, ShutdownSignal};
use crate::EngineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use syncdock_schema::EngineConfig;
use syncdock_store::Database;
use tracing::{debug, info};

const CHECKPOINT_RECORD: &str = "last-checkpoint";

/// Built-in reference engine.
///
/// Uses the default bootstrap stages and runs an instance made of an event
/// logger and a periodic storage maintenance service.
#[derive(Debug, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl EngineBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn new_app(&self, ctx: AppContext) -> Result<Arc<dyn EngineApp>, EngineError> {
        Ok(Arc::new(LocalApp::new(ctx)))
    }
}

pub struct LocalApp {
    config: EngineConfig,
    /// Released in `wait` once every service holding a clone has been joined,
    /// so the storage lock is free by the time the instance reports termination.
    database: Mutex<Option<Arc<Database>>>,
    events: Arc<EventLogger>,
    options: AppOptions,
    services: ServiceGroup,
    started: AtomicBool,
}

impl LocalApp {
    pub fn new(ctx: AppContext) -> Self {
        let AppContext {
            config,
            database,
            certificate,
            events,
            options,
        } = ctx;
        events.log(Event::Starting {
            device_id: certificate.device_id().to_string(),
        });
        Self {
            config,
            database: Mutex::new(Some(Arc::new(database))),
            events,
            options,
            services: ServiceGroup::new(ShutdownSignal::new()),
            started: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn options(&self) -> &AppOptions {
        &self.options
    }

    fn database(&self) -> Option<Arc<Database>> {
        self.database
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl EngineApp for LocalApp {
    fn start(&self) -> Result<(), EngineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }
        info!(
            "starting engine for device {} ({} folders, gui {})",
            self.config.device.name,
            self.config.folders.len(),
            if self.config.gui.enabled {
                self.config.gui.address.as_str()
            } else {
                "disabled"
            }
        );
        if let Some(dir) = &self.options.asset_dir {
            debug!("serving gui assets from {}", dir.display());
        }
        if let Some(url) = &self.options.profiler_url {
            debug!("profiler endpoint requested at {url}");
        }

        let events = Arc::clone(&self.events);
        let verbose = self.options.verbose;
        self.services.spawn("events", move |signal| {
            events.serve(signal, verbose);
            Ok(())
        })?;

        let database = self.database().ok_or_else(|| EngineError::Service {
            name: "maintenance".to_owned(),
            reason: "database already closed".to_owned(),
        })?;
        let events = Arc::clone(&self.events);
        let interval = self.options.maintenance_interval;
        self.services.spawn("maintenance", move |signal| {
            while signal.wait_timeout(interval).is_none() {
                let stamp = chrono::Utc::now().to_rfc3339();
                database.put_record(CHECKPOINT_RECORD, stamp.as_bytes())?;
                database.checkpoint()?;
                events.log(Event::Checkpoint);
            }
            Ok(())
        })?;

        self.events.log(Event::StartupComplete);
        info!("engine started");
        Ok(())
    }

    fn stop(&self, status: ExitStatus) -> ExitStatus {
        let effective = self.services.signal().request(status);
        if effective == status {
            info!("engine stopping ({status})");
        }
        self.events.log(Event::Stopping {
            status: effective.to_string(),
        });
        effective
    }

    fn wait(&self) -> ExitStatus {
        let status = self.services.signal().wait();
        self.services.join_all();
        self.database
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        info!("engine stopped ({status})");
        status
    }
}
