use crate::CoreError;
use std::fmt;

/// Where the process-wide instance is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl InstanceState {
    pub fn as_i32(self) -> i32 {
        match self {
            InstanceState::Idle => 0,
            InstanceState::Starting => 1,
            InstanceState::Running => 2,
            InstanceState::Stopping => 3,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceState::Idle => write!(f, "idle"),
            InstanceState::Starting => write!(f, "starting"),
            InstanceState::Running => write!(f, "running"),
            InstanceState::Stopping => write!(f, "stopping"),
        }
    }
}

pub fn validate_transition(from: InstanceState, to: InstanceState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (InstanceState::Idle, InstanceState::Starting)
            | (
                InstanceState::Starting,
                InstanceState::Running | InstanceState::Idle
            )
            | (
                InstanceState::Running,
                InstanceState::Stopping | InstanceState::Idle
            )
            | (InstanceState::Stopping, InstanceState::Idle)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}
