use crate::backend::{AppContext, ConfigPolicy, EngineApp, EngineBackend, ExitStatus};
use crate::cert::Certificate;
use crate::events::EventLogger;
use crate::services::ShutdownSignal;
use crate::EngineError;
use std::path::Path;
use std::sync::{Arc, Mutex};
use syncdock_schema::EngineConfig;
use syncdock_store::{Database, Tuning};

/// A step the mock backend can be told to fail at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockStage {
    Certificate,
    Config,
    Database,
    Start,
}

/// Scriptable backend for tests.
///
/// Credentials and configuration are produced in memory; only the database
/// is real, so storage locking behaves as in production.
#[derive(Default)]
pub struct MockBackend {
    fail_at: Option<MockStage>,
    exit_after_start: Option<ExitStatus>,
    calls: Arc<Mutex<Vec<MockStage>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing_at(mut self, stage: MockStage) -> Self {
        self.fail_at = Some(stage);
        self
    }

    /// The instance terminates on its own with `status` right after starting.
    #[must_use]
    pub fn exiting_with(mut self, status: ExitStatus) -> Self {
        self.exit_after_start = Some(status);
        self
    }

    /// Stages reached so far, in order.
    pub fn calls(&self) -> Vec<MockStage> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn enter(&self, stage: MockStage) -> Result<(), EngineError> {
        record(&self.calls, stage);
        if self.fail_at == Some(stage) {
            return Err(injected(stage));
        }
        Ok(())
    }
}

fn record(calls: &Mutex<Vec<MockStage>>, stage: MockStage) {
    if let Ok(mut calls) = calls.lock() {
        calls.push(stage);
    }
}

fn injected(stage: MockStage) -> EngineError {
    let what = format!("mock failure at {stage:?}");
    match stage {
        MockStage::Certificate => EngineError::Credential(what),
        MockStage::Config => EngineError::Config(what),
        MockStage::Database => EngineError::Io(std::io::Error::other(what)),
        MockStage::Start => EngineError::Service {
            name: "mock".to_owned(),
            reason: what,
        },
    }
}

impl EngineBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn load_or_generate_certificate(
        &self,
        _cert_file: &Path,
        _key_file: &Path,
    ) -> Result<Certificate, EngineError> {
        self.enter(MockStage::Certificate)?;
        Certificate::generate("mock")
    }

    fn load_config_at_startup(
        &self,
        _path: &Path,
        cert: &Certificate,
        _events: &EventLogger,
        _policy: ConfigPolicy,
    ) -> Result<EngineConfig, EngineError> {
        self.enter(MockStage::Config)?;
        Ok(EngineConfig::new_default(cert.device_id(), "mock", "mock-key"))
    }

    fn open_database(&self, path: &Path, tuning: Tuning) -> Result<Database, EngineError> {
        self.enter(MockStage::Database)?;
        Ok(Database::open(path, tuning)?)
    }

    fn new_app(&self, ctx: AppContext) -> Result<Arc<dyn EngineApp>, EngineError> {
        Ok(Arc::new(MockApp {
            signal: ShutdownSignal::new(),
            database: Mutex::new(Some(ctx.database)),
            fail_start: self.fail_at == Some(MockStage::Start),
            exit_after_start: self.exit_after_start,
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct MockApp {
    signal: ShutdownSignal,
    database: Mutex<Option<Database>>,
    fail_start: bool,
    exit_after_start: Option<ExitStatus>,
    calls: Arc<Mutex<Vec<MockStage>>>,
}

impl EngineApp for MockApp {
    fn start(&self) -> Result<(), EngineError> {
        record(&self.calls, MockStage::Start);
        if self.fail_start {
            return Err(injected(MockStage::Start));
        }
        if let Some(status) = self.exit_after_start {
            self.signal.request(status);
        }
        Ok(())
    }

    fn stop(&self, status: ExitStatus) -> ExitStatus {
        self.signal.request(status)
    }

    fn wait(&self) -> ExitStatus {
        let status = self.signal.wait();
        if let Ok(mut db) = self.database.lock() {
            db.take();
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_stages_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = MockBackend::new();
        let events = EventLogger::new();

        let cert = backend
            .load_or_generate_certificate(&tmp.path().join("c"), &tmp.path().join("k"))
            .unwrap();
        backend
            .load_config_at_startup(&tmp.path().join("cfg"), &cert, &events, ConfigPolicy::default())
            .unwrap();
        backend
            .open_database(&tmp.path().join("db"), Tuning::Auto)
            .unwrap();

        assert_eq!(
            backend.calls(),
            vec![MockStage::Certificate, MockStage::Config, MockStage::Database]
        );
        assert!(!tmp.path().join("c").exists());
    }

    #[test]
    fn injected_failure_matches_stage() {
        let backend = MockBackend::new().failing_at(MockStage::Config);
        let cert = Certificate::generate("x").unwrap();
        let err = backend
            .load_config_at_startup(
                Path::new("/nonexistent"),
                &cert,
                &EventLogger::new(),
                ConfigPolicy::default(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
