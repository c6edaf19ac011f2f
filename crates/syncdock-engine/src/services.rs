use crate::backend::ExitStatus;
use crate::EngineError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// One-shot termination request shared by an instance and its services.
///
/// The first requested status wins; later requests observe it.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<Option<ExitStatus>>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ExitStatus>> {
        // The guarded value is a plain Option; a panic while holding the lock
        // cannot leave it half-written.
        self.inner
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn request(&self, status: ExitStatus) -> ExitStatus {
        let mut guard = self.lock();
        match *guard {
            Some(existing) => existing,
            None => {
                *guard = Some(status);
                self.inner.1.notify_all();
                status
            }
        }
    }

    pub fn status(&self) -> Option<ExitStatus> {
        *self.lock()
    }

    pub fn is_requested(&self) -> bool {
        self.status().is_some()
    }

    /// Block until termination is requested.
    pub fn wait(&self) -> ExitStatus {
        let mut guard = self.lock();
        loop {
            if let Some(status) = *guard {
                return status;
            }
            guard = self
                .inner
                .1
                .wait(guard)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout`. Returns the status if termination was
    /// requested in the meantime.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitStatus> {
        let guard = self.lock();
        if guard.is_some() {
            return *guard;
        }
        let (guard, _) = self
            .inner
            .1
            .wait_timeout_while(guard, timeout, |status| status.is_none())
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard
    }
}

/// Background threads scoped to one instance.
///
/// A service that returns an error or panics requests termination with
/// [`ExitStatus::Error`]. [`join_all`](Self::join_all) must run before the
/// instance reports that it has terminated.
pub struct ServiceGroup {
    signal: ShutdownSignal,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl ServiceGroup {
    pub fn new(signal: ShutdownSignal) -> Self {
        Self {
            signal,
            handles: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn signal(&self) -> &ShutdownSignal {
        &self.signal
    }

    pub fn spawn<F>(&self, name: &str, service: F) -> Result<(), EngineError>
    where
        F: FnOnce(&ShutdownSignal) -> Result<(), EngineError> + Send + 'static,
    {
        let signal = self.signal.clone();
        let service_name = name.to_owned();
        let handle = std::thread::Builder::new()
            .name(format!("syncdock-{name}"))
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| service(&signal)));
                match outcome {
                    Ok(Ok(())) => debug!("service {service_name} exited"),
                    Ok(Err(e)) => {
                        warn!("service {service_name} failed: {e}");
                        signal.request(ExitStatus::Error);
                    }
                    Err(_) => {
                        warn!("service {service_name} panicked");
                        signal.request(ExitStatus::Error);
                    }
                }
            })
            .map_err(|e| EngineError::Spawn {
                name: name.to_owned(),
                reason: e.to_string(),
            })?;

        self.handles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((name.to_owned(), handle));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .map_or(0, |handles| handles.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Join every spawned service. Callers request shutdown first.
    pub fn join_all(&self) {
        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for (name, handle) in handles {
            if handle.join().is_err() {
                warn!("service {name} could not be joined");
            } else {
                debug!("service {name} joined");
            }
        }
    }
}
