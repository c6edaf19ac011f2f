//! Forwarding of `tracing` events to a host-registered sink.
//!
//! [`CallbackLayer`] formats each event into a buffer owned by the logging
//! call and hands the bytes to a [`LogSink`]. The buffer is dropped as soon
//! as the sink returns, so sinks must copy anything they want to keep. The
//! layer holds no mutable state of its own and runs on whatever thread
//! emitted the event.

use crate::CoreError;
use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Severity as numbered on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug = 0,
    Verbose = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl Severity {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<Level> for Severity {
    fn from(level: Level) -> Self {
        match level {
            Level::TRACE => Severity::Debug,
            Level::DEBUG => Severity::Verbose,
            Level::INFO => Severity::Info,
            Level::WARN => Severity::Warn,
            _ => Severity::Error,
        }
    }
}

/// Receiver of formatted log lines.
///
/// Called concurrently from any thread; must not block.
pub trait LogSink: Send + Sync + 'static {
    fn deliver(&self, severity: Severity, message: &[u8]);
}

impl<F> LogSink for F
where
    F: Fn(Severity, &[u8]) + Send + Sync + 'static,
{
    fn deliver(&self, severity: Severity, message: &[u8]) {
        self(severity, message);
    }
}

pub struct CallbackLayer<K> {
    sink: K,
}

impl<K: LogSink> CallbackLayer<K> {
    pub fn new(sink: K) -> Self {
        Self { sink }
    }
}

impl<S, K> Layer<S> for CallbackLayer<K>
where
    S: Subscriber,
    K: LogSink,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut line = String::new();
        event.record(&mut LineVisitor { line: &mut line });
        if line.is_empty() {
            return;
        }
        self.sink
            .deliver(Severity::from(*event.metadata().level()), line.as_bytes());
    }
}

/// Renders `message` first, then the remaining fields as `name=value`.
struct LineVisitor<'a> {
    line: &'a mut String,
}

impl LineVisitor<'_> {
    fn push_field(&mut self, field: &Field, value: fmt::Arguments<'_>) {
        if field.name() == "message" {
            if self.line.is_empty() {
                let _ = self.line.write_fmt(value);
            } else {
                let rest = std::mem::take(self.line);
                let _ = self.line.write_fmt(value);
                self.line.push(' ');
                self.line.push_str(&rest);
            }
            return;
        }
        if !self.line.is_empty() {
            self.line.push(' ');
        }
        let _ = write!(self.line, "{}={value}", field.name());
    }
}

impl Visit for LineVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push_field(field, format_args!("{value}"));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push_field(field, format_args!("{value:?}"));
    }
}

/// Install the bridge as the process-wide subscriber, admitting every level.
///
/// Fails if a global subscriber is already set, including by an earlier
/// call.
pub fn install<K: LogSink>(sink: K) -> Result<(), CoreError> {
    tracing_subscriber::registry()
        .with(CallbackLayer::new(sink).with_filter(LevelFilter::TRACE))
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))
}
