use std::io;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::error::Elapsed as TimeElapsed;

/// Failures of the shell/sync transport itself, as opposed to a command
/// that ran and reported an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Time limit for the command output exceeded
    #[error("Timeout")]
    Timeout,
    /// The device refused to run the command
    #[error("Command rejected: {0}")]
    Rejected(String),
    /// The shell stopped producing output
    #[error("Shell unresponsive")]
    Unresponsive,
    #[error("I/O: {0}")]
    Io(String),
}

impl From<TimeElapsed> for TransportError {
    fn from(_: TimeElapsed) -> Self {
        Self::Timeout
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io(error.to_string()),
        }
    }
}

/// Category of a failed sync (push/pull) transfer. Only `Permission`
/// triggers the temp location fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorCategory {
    Permission,
    Protocol,
    Cancelled,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category:?}: {message}")]
pub struct SyncError {
    pub category: SyncErrorCategory,
    pub message: String,
}

impl SyncError {
    pub fn new<M: Into<String>>(category: SyncErrorCategory, message: M) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn permission<M: Into<String>>(message: M) -> Self {
        Self::new(SyncErrorCategory::Permission, message)
    }

    pub fn cancelled() -> Self {
        Self::new(SyncErrorCategory::Cancelled, "transfer cancelled")
    }

    pub const fn is_permission(&self) -> bool {
        matches!(self.category, SyncErrorCategory::Permission)
    }
}

/// Enum for file system errors
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Transport: {0}")]
    Transport(#[from] TransportError),
    /// A shell command ran and the error sentinel was echoed
    #[error("{message}")]
    ShellCommand {
        command: String,
        message: String,
        output: Vec<String>,
    },
    #[error("Sync transfer: {0}")]
    SyncTransfer(#[from] SyncError),
    /// Rejected before any round trip to the device
    #[error("Invalid argument: {0}")]
    Validation(String),
    #[error("File already exists: {0}")]
    AlreadyExists(String),
    #[error("No such file or directory: {0}")]
    NotFound(String),
    /// The device printed something none of the known formats match
    #[error("Unexpected output: {0}")]
    UnexpectedOutput(String),
    #[error("Cancelled")]
    Cancelled,
    /// Local file system failure
    #[error("I/O: {0}")]
    IO(String),
}

impl Error {
    /// Returns `true` for a sync failure of the permission category.
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::SyncTransfer(error) if error.is_permission())
    }

    /// Returns `true` for failures a capability probe reads as "unsupported".
    pub const fn is_probe_negative(&self) -> bool {
        matches!(self, Self::ShellCommand { .. } | Self::Transport(_))
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Self::IO(error.to_string())
    }
}

impl From<TimeElapsed> for Error {
    fn from(_: TimeElapsed) -> Self {
        Self::Transport(TransportError::Timeout)
    }
}

impl From<JoinError> for Error {
    fn from(error: JoinError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Transport(TransportError::Io(format!("worker task failed: {error}")))
        }
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::IO(message) => Self::new(io::ErrorKind::Other, message),
            Error::AlreadyExists(path) => Self::new(io::ErrorKind::AlreadyExists, path),
            Error::NotFound(path) => Self::new(io::ErrorKind::NotFound, path),
            Error::Validation(message) => Self::new(io::ErrorKind::InvalidInput, message),
            Error::Transport(TransportError::Timeout) => {
                Self::new(io::ErrorKind::TimedOut, "timeout")
            }
            Error::SyncTransfer(error) if error.is_permission() => {
                Self::new(io::ErrorKind::PermissionDenied, error.message)
            }
            other => Self::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_category_is_detected() {
        let error: Error = SyncError::permission("remote object doesn't exist").into();
        assert!(error.is_permission_denied());

        let error: Error = SyncError::new(SyncErrorCategory::Protocol, "bad packet").into();
        assert!(!error.is_permission_denied());
    }

    #[test]
    fn probe_negative_covers_shell_and_transport() {
        let shell = Error::ShellCommand {
            command: "test -e /x".to_owned(),
            message: "command failed".to_owned(),
            output: vec![],
        };
        assert!(shell.is_probe_negative());
        assert!(Error::Transport(TransportError::Unresponsive).is_probe_negative());
        assert!(!Error::UnexpectedOutput("?".to_owned()).is_probe_negative());
    }

    #[test]
    fn io_conversion_keeps_kind() {
        let error: io::Error = Error::AlreadyExists("/sdcard/a.txt".to_owned()).into();
        assert_eq!(error.kind(), io::ErrorKind::AlreadyExists);
    }
}
