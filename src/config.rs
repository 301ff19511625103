use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Directory the shell user can always write to.
pub const DEFAULT_TEMP_DIRECTORY: &str = "/data/local/tmp";
/// Directory holding the capability probe scratch files.
pub const DEFAULT_PROBE_DIRECTORY: &str = "/data/local/tmp/device-explorer";
/// Shortest delay allowed between two progress reports.
pub const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(50);

/// Options shared by every service of a device file system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum time to wait for the output of a single shell command.
    /// Default: 10 seconds
    pub command_timeout: Duration,
    /// Where transfers stage files they cannot move directly.
    pub temp_directory: String,
    pub probe_directory: String,
    /// Minimum delay between two progress reports of one transfer. Values
    /// below [`MIN_PROGRESS_INTERVAL`] are raised to it when a transfer starts.
    /// Default: 50 milliseconds
    pub progress_interval: Duration,
    /// Output lines kept in a [`ShellCommand`](crate::Error::ShellCommand) error.
    pub max_error_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(10),
            temp_directory: DEFAULT_TEMP_DIRECTORY.to_owned(),
            probe_directory: DEFAULT_PROBE_DIRECTORY.to_owned(),
            progress_interval: MIN_PROGRESS_INTERVAL,
            max_error_lines: 5,
        }
    }
}

impl Config {
    /// Set the maximum command response time in seconds.
    pub fn set_timeout(&mut self, secs: u64) {
        self.command_timeout = Duration::from_secs(secs);
    }

    pub fn set_temp_directory<T: Into<String>>(&mut self, path: T) {
        self.temp_directory = path.into();
    }

    pub fn set_probe_directory<T: Into<String>>(&mut self, path: T) {
        self.probe_directory = path.into();
    }

    /// Progress is never reported more often than every 50ms, whatever is set here.
    pub fn set_progress_interval(&mut self, interval: Duration) {
        self.progress_interval = interval.max(MIN_PROGRESS_INTERVAL);
    }
}
