use std::fmt;
use syncdock_engine::ExitStatus;

/// Stable numeric outcome of a controller call.
///
/// The numbers are part of the host contract and never change meaning.
/// Codes the engine reports that are not listed here travel as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCode {
    Success,
    CredentialError,
    ConfigError,
    PathError,
    StorageError,
    InternalError,
    Restart,
    AlreadyRunning,
    NotRunning,
    Other(i32),
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::CredentialError => 1,
            ExitCode::ConfigError => 2,
            ExitCode::PathError => 3,
            ExitCode::StorageError => 4,
            ExitCode::InternalError => 5,
            ExitCode::Restart => 6,
            ExitCode::AlreadyRunning => -1,
            ExitCode::NotRunning => -2,
            ExitCode::Other(code) => code,
        }
    }

    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => ExitCode::Success,
            1 => ExitCode::CredentialError,
            2 => ExitCode::ConfigError,
            3 => ExitCode::PathError,
            4 => ExitCode::StorageError,
            5 => ExitCode::InternalError,
            6 => ExitCode::Restart,
            -1 => ExitCode::AlreadyRunning,
            -2 => ExitCode::NotRunning,
            other => ExitCode::Other(other),
        }
    }

    /// The termination status a stop request with this code asks for.
    pub fn to_status(self) -> ExitStatus {
        match self {
            ExitCode::Success => ExitStatus::Success,
            ExitCode::Restart => ExitStatus::Restart,
            ExitCode::InternalError => ExitStatus::Error,
            other => ExitStatus::Other(other.as_i32()),
        }
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Success
    }

    /// Whether a stop request may carry this code.
    ///
    /// Bootstrap failures and the two no-op codes describe what a controller
    /// call did, so a blocked start must never report them for a requested
    /// shutdown.
    pub fn is_stop_code(self) -> bool {
        matches!(
            ExitCode::from_i32(self.as_i32()),
            ExitCode::Success | ExitCode::InternalError | ExitCode::Restart | ExitCode::Other(_)
        )
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => ExitCode::Success,
            ExitStatus::Error => ExitCode::InternalError,
            ExitStatus::Restart => ExitCode::Restart,
            ExitStatus::Other(code) => ExitCode::from_i32(code),
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitCode::Success => "success",
            ExitCode::CredentialError => "credential error",
            ExitCode::ConfigError => "config error",
            ExitCode::PathError => "path error",
            ExitCode::StorageError => "storage error",
            ExitCode::InternalError => "internal error",
            ExitCode::Restart => "restart",
            ExitCode::AlreadyRunning => "already running",
            ExitCode::NotRunning => "not running",
            ExitCode::Other(code) => return write!(f, "exit code {code}"),
        };
        write!(f, "{name} ({})", self.as_i32())
    }
}
