//! Concurrent start/stop behaviour of the controller, driven through the
//! mock engine so that only the lifecycle rules are under test.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use syncdock_core::{CallbackLayer, Controller, ExitCode, InstanceState, Severity, StartOptions};
use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use syncdock_engine::{
    AppContext, Certificate, ConfigPolicy, EngineApp, EngineBackend, EngineError, EventLogger,
    MockBackend, MockStage,
};
use syncdock_schema::EngineConfig;
use syncdock_store::{Database, Location, LocationSet, Tuning};

fn controller_with(root: &Path, backend: Arc<dyn EngineBackend>) -> Controller {
    Controller::with_locations(
        backend,
        LocationSet::new(root.join("config"), root.join("data")),
    )
}

fn wait_for_state(c: &Controller, state: InstanceState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while c.state() != state {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {state}, still {}",
            c.state()
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Blocks in the certificate stage until released.
struct GatedBackend {
    inner: MockBackend,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl GatedBackend {
    fn new() -> (Self, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let backend = Self {
            inner: MockBackend::new(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        (backend, entered_rx, release_tx)
    }
}

impl EngineBackend for GatedBackend {
    fn name(&self) -> &str {
        "gated"
    }

    fn load_or_generate_certificate(
        &self,
        cert_file: &Path,
        key_file: &Path,
    ) -> Result<Certificate, EngineError> {
        self.entered.lock().unwrap().send(()).unwrap();
        self.release.lock().unwrap().recv().unwrap();
        self.inner.load_or_generate_certificate(cert_file, key_file)
    }

    fn load_config_at_startup(
        &self,
        path: &Path,
        cert: &Certificate,
        events: &EventLogger,
        policy: ConfigPolicy,
    ) -> Result<EngineConfig, EngineError> {
        self.inner
            .load_config_at_startup(path, cert, events, policy)
    }

    fn open_database(&self, path: &Path, tuning: Tuning) -> Result<Database, EngineError> {
        self.inner.open_database(path, tuning)
    }

    fn new_app(&self, ctx: AppContext) -> Result<Arc<dyn EngineApp>, EngineError> {
        self.inner.new_app(ctx)
    }
}

#[test]
fn start_while_running_is_rejected_without_side_effects() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(MockBackend::new());
    let c = controller_with(tmp.path(), Arc::clone(&backend) as Arc<dyn EngineBackend>);

    std::thread::scope(|s| {
        let runner = s.spawn(|| c.start(&StartOptions::default()));
        wait_for_state(&c, InstanceState::Running);

        let calls_before = backend.calls();
        let locations_before = c.locations();
        let second = StartOptions {
            config_dir: tmp.path().join("other").to_string_lossy().into_owned(),
            ensure_config_dir_exists: true,
            ..StartOptions::default()
        };
        assert_eq!(c.start(&second), ExitCode::AlreadyRunning);
        assert_eq!(backend.calls(), calls_before);
        assert_eq!(c.locations(), locations_before);
        assert!(!tmp.path().join("other").exists());

        assert_eq!(c.stop(ExitCode::Success), ExitCode::Success);
        assert_eq!(runner.join().unwrap(), ExitCode::Success);
    });
    assert_eq!(c.state(), InstanceState::Idle);
}

#[test]
fn stop_while_starting_has_no_target() {
    let tmp = tempfile::tempdir().unwrap();
    let (backend, entered, release) = GatedBackend::new();
    let c = controller_with(tmp.path(), Arc::new(backend));

    std::thread::scope(|s| {
        let runner = s.spawn(|| c.start(&StartOptions::default()));
        entered.recv().unwrap();

        assert_eq!(c.state(), InstanceState::Starting);
        assert_eq!(c.stop(ExitCode::Success), ExitCode::NotRunning);
        assert_eq!(c.start(&StartOptions::default()), ExitCode::AlreadyRunning);
        assert_eq!(c.reset_database(), ExitCode::AlreadyRunning);

        release.send(()).unwrap();
        wait_for_state(&c, InstanceState::Running);
        assert_eq!(c.stop(ExitCode::Success), ExitCode::Success);
        assert_eq!(runner.join().unwrap(), ExitCode::Success);
    });
}

#[test]
fn concurrent_starts_admit_exactly_one() {
    let tmp = tempfile::tempdir().unwrap();
    let c = controller_with(tmp.path(), Arc::new(MockBackend::new()));

    std::thread::scope(|s| {
        let runners: Vec<_> = (0..8)
            .map(|_| s.spawn(|| c.start(&StartOptions::default())))
            .collect();
        wait_for_state(&c, InstanceState::Running);
        let deadline = Instant::now() + Duration::from_secs(5);
        while runners.iter().filter(|r| r.is_finished()).count() < 7 {
            assert!(Instant::now() < deadline, "rejected starts did not return");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(c.stop(ExitCode::Success), ExitCode::Success);

        let codes: Vec<ExitCode> = runners.into_iter().map(|r| r.join().unwrap()).collect();
        assert_eq!(
            codes.iter().filter(|&&code| code == ExitCode::Success).count(),
            1,
            "{codes:?}"
        );
        assert_eq!(
            codes
                .iter()
                .filter(|&&code| code == ExitCode::AlreadyRunning)
                .count(),
            7,
            "{codes:?}"
        );
    });
}

#[test]
fn stop_code_becomes_start_result() {
    let tmp = tempfile::tempdir().unwrap();
    let c = controller_with(tmp.path(), Arc::new(MockBackend::new()));

    for code in [ExitCode::Restart, ExitCode::InternalError, ExitCode::Other(42)] {
        std::thread::scope(|s| {
            let runner = s.spawn(|| c.start(&StartOptions::default()));
            wait_for_state(&c, InstanceState::Running);
            assert_eq!(c.stop(code), ExitCode::Success);
            assert_eq!(runner.join().unwrap(), code);
        });
        assert_eq!(c.state(), InstanceState::Idle);
    }
}

#[test]
fn reset_is_refused_while_running() {
    let tmp = tempfile::tempdir().unwrap();
    let c = controller_with(tmp.path(), Arc::new(MockBackend::new()));
    let db = c.locations().get(Location::Database);

    std::thread::scope(|s| {
        let runner = s.spawn(|| c.start(&StartOptions::default()));
        wait_for_state(&c, InstanceState::Running);
        assert_eq!(c.reset_database(), ExitCode::AlreadyRunning);
        assert!(db.exists());
        c.stop(ExitCode::Success);
        runner.join().unwrap();
    });

    assert_eq!(c.reset_database(), ExitCode::Success);
    assert!(!db.exists());
}

#[test]
fn failed_start_can_be_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let c = controller_with(
        tmp.path(),
        Arc::new(MockBackend::new().failing_at(MockStage::Config)),
    );
    assert_eq!(c.start(&StartOptions::default()), ExitCode::ConfigError);
    assert_eq!(c.start(&StartOptions::default()), ExitCode::ConfigError);
    assert_eq!(c.state(), InstanceState::Idle);
}

/// Dispatch whose sink runs `on_line` for every log line, on the logging
/// thread, with the controller in `cell`.
fn reentrant_dispatch(
    cell: &Arc<OnceLock<Controller>>,
    on_line: impl Fn(&Controller, &str) + Send + Sync + 'static,
) -> Dispatch {
    let cell = Arc::clone(cell);
    let sink = move |_: Severity, msg: &[u8]| {
        if let Some(c) = cell.get() {
            on_line(c, &String::from_utf8_lossy(msg));
        }
    };
    Dispatch::new(tracing_subscriber::registry().with(CallbackLayer::new(sink)))
}

/// Run `f` on its own thread under `dispatch`; fail instead of hanging.
fn within_deadline<R: Send + 'static>(
    dispatch: Dispatch,
    f: impl FnOnce() -> R + Send + 'static,
) -> R {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let out = tracing::dispatcher::with_default(&dispatch, f);
        let _ = tx.send(out);
    });
    rx.recv_timeout(Duration::from_secs(10))
        .expect("controller call did not return; log sink re-entry blocked")
}

#[test]
fn log_sink_may_query_state_during_failed_start() {
    let tmp = tempfile::tempdir().unwrap();
    let cell = Arc::new(OnceLock::new());
    let queries = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&queries);
    let dispatch = reentrant_dispatch(&cell, move |c, _| {
        let state = c.state();
        seen.lock().unwrap().push(state);
    });
    let _ = cell.set(controller_with(
        tmp.path(),
        Arc::new(MockBackend::new().failing_at(MockStage::Certificate)),
    ));

    let start_cell = Arc::clone(&cell);
    let code = within_deadline(dispatch, move || {
        start_cell.get().unwrap().start(&StartOptions::default())
    });
    assert_eq!(code, ExitCode::CredentialError);
    assert_eq!(cell.get().unwrap().state(), InstanceState::Idle);
    assert!(queries
        .lock()
        .unwrap()
        .contains(&InstanceState::Starting));
}

#[test]
fn log_sink_may_stop_the_instance_it_is_told_about() {
    let tmp = tempfile::tempdir().unwrap();
    let cell = Arc::new(OnceLock::new());
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stopped);
    let dispatch = reentrant_dispatch(&cell, move |c, line| {
        let _ = c.state();
        if line.ends_with("-> running") && !flag.swap(true, Ordering::SeqCst) {
            assert_eq!(c.stop(ExitCode::Restart), ExitCode::Success);
        }
    });
    let _ = cell.set(controller_with(tmp.path(), Arc::new(MockBackend::new())));

    let start_cell = Arc::clone(&cell);
    let code = within_deadline(dispatch, move || {
        start_cell.get().unwrap().start(&StartOptions::default())
    });
    assert!(stopped.load(Ordering::SeqCst));
    assert_eq!(code, ExitCode::Restart);
    assert_eq!(cell.get().unwrap().state(), InstanceState::Idle);
}

#[test]
fn log_sink_may_call_back_during_reset() {
    let tmp = tempfile::tempdir().unwrap();
    let cell = Arc::new(OnceLock::new());
    let during = Arc::new(Mutex::new(None));
    let record = Arc::clone(&during);
    let entered = Arc::new(AtomicBool::new(false));
    let dispatch = reentrant_dispatch(&cell, move |c, line| {
        if line.starts_with("removed database") && !entered.swap(true, Ordering::SeqCst) {
            let observed = (c.state(), c.start(&StartOptions::default()), c.reset_database());
            *record.lock().unwrap() = Some(observed);
        }
    });
    let c = controller_with(tmp.path(), Arc::new(MockBackend::new()));
    let db = c.locations().get(Location::Database);
    drop(Database::open(&db, Tuning::Auto).unwrap());
    let _ = cell.set(c);

    let reset_cell = Arc::clone(&cell);
    let code = within_deadline(dispatch, move || reset_cell.get().unwrap().reset_database());
    assert_eq!(code, ExitCode::Success);
    assert!(!db.exists());
    assert_eq!(
        *during.lock().unwrap(),
        Some((
            InstanceState::Idle,
            ExitCode::AlreadyRunning,
            ExitCode::AlreadyRunning
        ))
    );
    assert_eq!(cell.get().unwrap().state(), InstanceState::Idle);
}
