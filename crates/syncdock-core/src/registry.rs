use crate::lifecycle::{validate_transition, InstanceState};
use crate::CoreError;
use std::sync::{Arc, Mutex, MutexGuard};
use syncdock_engine::{EngineApp, ExitStatus};
use tracing::{debug, error};

struct Slot {
    state: InstanceState,
    app: Option<Arc<dyn EngineApp>>,
    held_idle: bool,
}

type Step = (InstanceState, InstanceState);

impl Slot {
    fn transition(&mut self, to: InstanceState) -> Result<Step, CoreError> {
        validate_transition(self.state, to)?;
        let from = std::mem::replace(&mut self.state, to);
        Ok((from, to))
    }
}

// Called only once the slot guard is gone: log sinks may call back in.
fn log_step((from, to): Step) {
    debug!("instance {from} -> {to}");
}

/// Holder of the one instance a process may run.
///
/// `Idle -> Starting` is a compare-and-swap under the slot mutex, handed out
/// as a [`StartTicket`]. Only the ticket publishes or clears the handle; stop
/// requests only read it. The mutex is never held while logging or while
/// calling into the engine.
pub struct InstanceRegistry {
    slot: Mutex<Slot>,
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: InstanceState::Idle,
                app: None,
                held_idle: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn state(&self) -> InstanceState {
        self.lock().state
    }

    /// Claim the slot for a start attempt. `None` unless the registry is
    /// idle and not held by [`while_idle`](Self::while_idle).
    pub fn try_begin(&self) -> Option<StartTicket<'_>> {
        let step = {
            let mut slot = self.lock();
            if slot.state != InstanceState::Idle || slot.held_idle {
                return None;
            }
            slot.transition(InstanceState::Starting).ok()?
        };
        log_step(step);
        Some(StartTicket { registry: self })
    }

    /// Ask the published instance to terminate.
    ///
    /// Returns the status the instance will report, or `None` when there is
    /// no published instance (idle, or still bootstrapping). A repeated
    /// request while stopping signals the same instance again.
    pub fn signal_stop(&self, status: ExitStatus) -> Option<ExitStatus> {
        let (app, step) = {
            let mut slot = self.lock();
            let app = slot.app.clone()?;
            let step = if slot.state == InstanceState::Running {
                Some(slot.transition(InstanceState::Stopping).ok()?)
            } else {
                None
            };
            (app, step)
        };
        if let Some(step) = step {
            log_step(step);
        }
        Some(app.stop(status))
    }

    /// Run `f` while the registry is held idle, so no start can begin
    /// meanwhile. `None` if busy or already held.
    ///
    /// The slot mutex is released while `f` runs; `f` may log and may call
    /// back into the registry.
    pub fn while_idle<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let _hold = self.hold_idle()?;
        Some(f())
    }

    fn hold_idle(&self) -> Option<IdleHold<'_>> {
        let mut slot = self.lock();
        if slot.state != InstanceState::Idle || slot.held_idle {
            return None;
        }
        slot.held_idle = true;
        Some(IdleHold { registry: self })
    }
}

struct IdleHold<'a> {
    registry: &'a InstanceRegistry,
}

impl Drop for IdleHold<'_> {
    fn drop(&mut self) {
        self.registry.lock().held_idle = false;
    }
}

/// Exclusive right to the slot for one start call.
///
/// Dropping the ticket returns the registry to idle and clears the handle,
/// whether the run ended normally, bootstrap failed, or the start thread is
/// unwinding.
pub struct StartTicket<'a> {
    registry: &'a InstanceRegistry,
}

impl StartTicket<'_> {
    pub fn publish(&self, app: Arc<dyn EngineApp>) -> Result<(), CoreError> {
        let step = {
            let mut slot = self.registry.lock();
            let step = slot.transition(InstanceState::Running)?;
            slot.app = Some(app);
            step
        };
        log_step(step);
        Ok(())
    }
}

impl Drop for StartTicket<'_> {
    fn drop(&mut self) {
        let (outcome, app) = {
            let mut slot = self.registry.lock();
            let outcome = slot.transition(InstanceState::Idle);
            if outcome.is_err() {
                slot.state = InstanceState::Idle;
            }
            (outcome, slot.app.take())
        };
        drop(app);
        match outcome {
            Ok(step) => log_step(step),
            Err(e) => error!("releasing instance slot: {e}"),
        }
    }
}
