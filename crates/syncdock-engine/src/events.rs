use crate::services::ShutdownSignal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ConfigSaved { path: PathBuf },
    ConfigMigrated { from: u32, to: u32 },
    Starting { device_id: String },
    StartupComplete,
    Checkpoint,
    Stopping { status: String },
}

/// Buffered engine event stream.
///
/// Events may be logged before anything serves the logger; they queue until
/// [`serve`](Self::serve) runs as an instance service. Logging never blocks.
pub struct EventLogger {
    tx: Sender<Event>,
    rx: Mutex<Option<Receiver<Event>>>,
    delivered: AtomicU64,
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLogger {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            delivered: AtomicU64::new(0),
        }
    }

    pub fn log(&self, event: Event) {
        // The receiver lives as long as self, so send only fails after serve
        // has returned; late events are dropped.
        let _ = self.tx.send(event);
    }

    /// Number of events handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Drain events until `shutdown` is requested, then drain what is left.
    /// Only one caller gets the stream; later calls return immediately.
    pub fn serve(&self, shutdown: &ShutdownSignal, verbose: bool) {
        let Some(rx) = self.rx.lock().ok().and_then(|mut guard| guard.take()) else {
            debug!("event logger already served");
            return;
        };
        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(event) => self.deliver(&event, verbose),
                Err(RecvTimeoutError::Timeout) => {
                    if shutdown.is_requested() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        while let Ok(event) = rx.try_recv() {
            self.deliver(&event, verbose);
        }
    }

    fn deliver(&self, event: &Event, verbose: bool) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if verbose {
            info!("event: {event:?}");
        } else {
            debug!("event: {event:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ExitStatus;
    use std::sync::Arc;

    #[test]
    fn events_logged_before_serve_are_delivered() {
        let logger = Arc::new(EventLogger::new());
        logger.log(Event::StartupComplete);
        logger.log(Event::Checkpoint);

        let shutdown = ShutdownSignal::new();
        shutdown.request(ExitStatus::Success);
        logger.serve(&shutdown, false);

        assert_eq!(logger.delivered(), 2);
    }

    #[test]
    fn serve_stops_on_shutdown() {
        let logger = Arc::new(EventLogger::new());
        let shutdown = ShutdownSignal::new();

        let worker = {
            let logger = Arc::clone(&logger);
            let shutdown = shutdown.clone();
            std::thread::spawn(move || logger.serve(&shutdown, true))
        };
        logger.log(Event::Checkpoint);
        shutdown.request(ExitStatus::Success);
        worker.join().unwrap();

        assert_eq!(logger.delivered(), 1);
    }

    #[test]
    fn second_serve_returns_immediately() {
        let logger = EventLogger::new();
        let shutdown = ShutdownSignal::new();
        shutdown.request(ExitStatus::Success);
        logger.serve(&shutdown, false);
        logger.serve(&shutdown, false);
    }
}
