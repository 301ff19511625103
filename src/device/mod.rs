//! The connected device as seen by the file system.
//!
//! Discovery and connection management live elsewhere; the core only needs
//! a handle that can run shell commands, push/pull files over the sync
//! channel and tell whether `adbd` runs as root.

mod blocking;

use std::path::Path;

use crate::error::{SyncError, TransportError};

pub use blocking::{Blocking, BlockingDevice};

/// Receives the output of a streaming shell command one line at a time.
pub trait ShellOutputReceiver: Send {
    fn line(&mut self, line: &str);

    /// Checked between lines; returning `true` stops the command.
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl ShellOutputReceiver for Vec<String> {
    fn line(&mut self, line: &str) {
        self.push(line.to_owned());
    }
}

/// Progress callbacks of a single sync transfer, driven by the transport.
pub trait SyncProgress: Send {
    /// Called once before the first chunk. `total` is whatever the transport
    /// believes the size is and may be zero or truncated.
    #[allow(unused_variables)]
    fn start(&mut self, total: u64) {}

    /// Called after each chunk with the number of bytes it carried.
    fn advance(&mut self, bytes: u64);

    /// Checked between chunks; returning `true` aborts the transfer with
    /// [`SyncErrorCategory::Cancelled`](crate::SyncErrorCategory::Cancelled).
    fn is_cancelled(&self) -> bool {
        false
    }

    fn stop(&mut self) {}
}

/// Connected device handle. This is `async_trait`
///
/// Implementations whose I/O is blocking should implement
/// [`BlockingDevice`] instead and wrap it in [`Blocking`], which moves every
/// call onto the blocking worker pool.
#[async_trait]
pub trait Device: Send + Sync {
    /// Serial number identifying the device across reconnects.
    fn serial(&self) -> &str;

    /// Runs `command` and returns everything it printed.
    async fn execute_shell(&self, command: &str) -> Result<String, TransportError>;

    /// Runs an unterminated command, feeding each output line to `receiver`
    /// until the command ends or the receiver cancels.
    async fn execute_streaming(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
    ) -> Result<(), TransportError> {
        let output = self.execute_shell(command).await?;
        for line in output.lines() {
            if receiver.is_cancelled() {
                break;
            }
            receiver.line(line.trim_end_matches('\r'));
        }
        Ok(())
    }

    /// Whether the device shell already runs as root.
    async fn is_root(&self) -> Result<bool, TransportError>;

    async fn push_file(
        &self,
        local: &Path,
        remote: &str,
        progress: &mut dyn SyncProgress,
    ) -> Result<(), SyncError>;

    async fn pull_file(
        &self,
        remote: &str,
        local: &Path,
        progress: &mut dyn SyncProgress,
    ) -> Result<(), SyncError>;
}
