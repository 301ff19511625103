use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{sync::mpsc, task};

use super::{Device, ShellOutputReceiver, SyncProgress};
use crate::error::{SyncError, SyncErrorCategory, TransportError};

/// Synchronous counterpart of [`Device`] for transports with blocking I/O.
pub trait BlockingDevice: Send + Sync + 'static {
    fn serial(&self) -> &str;

    fn execute_shell(&self, command: &str) -> Result<String, TransportError>;

    fn execute_streaming(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
    ) -> Result<(), TransportError> {
        let output = self.execute_shell(command)?;
        for line in output.lines() {
            if receiver.is_cancelled() {
                break;
            }
            receiver.line(line.trim_end_matches('\r'));
        }
        Ok(())
    }

    fn is_root(&self) -> Result<bool, TransportError>;

    fn push_file(
        &self,
        local: &Path,
        remote: &str,
        progress: &mut dyn SyncProgress,
    ) -> Result<(), SyncError>;

    fn pull_file(
        &self,
        remote: &str,
        local: &Path,
        progress: &mut dyn SyncProgress,
    ) -> Result<(), SyncError>;
}

/// Runs a [`BlockingDevice`] on tokio's blocking worker pool.
///
/// Progress and output lines are sent back to the awaiting task over a
/// channel, so the caller's receivers never leave the calling task.
/// Cancellation travels the other way through a shared flag.
pub struct Blocking<D> {
    inner: Arc<D>,
}

impl<D: BlockingDevice> Blocking<D> {
    pub fn new(device: D) -> Self {
        Self {
            inner: Arc::new(device),
        }
    }

    pub fn get_ref(&self) -> &D {
        &self.inner
    }
}

fn worker_failed(error: &task::JoinError) -> TransportError {
    TransportError::Io(format!("worker task failed: {error}"))
}

enum ProgressEvent {
    Start(u64),
    Advance(u64),
    Stop,
}

struct ForwardProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    cancelled: Arc<AtomicBool>,
}

impl SyncProgress for ForwardProgress {
    fn start(&mut self, total: u64) {
        let _ = self.tx.send(ProgressEvent::Start(total));
    }

    fn advance(&mut self, bytes: u64) {
        let _ = self.tx.send(ProgressEvent::Advance(bytes));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        let _ = self.tx.send(ProgressEvent::Stop);
    }
}

struct ForwardLines {
    tx: mpsc::UnboundedSender<String>,
    cancelled: Arc<AtomicBool>,
}

impl ShellOutputReceiver for ForwardLines {
    fn line(&mut self, line: &str) {
        let _ = self.tx.send(line.to_owned());
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<D: BlockingDevice> Blocking<D> {
    async fn run_sync<F>(&self, progress: &mut dyn SyncProgress, op: F) -> Result<(), SyncError>
    where
        F: FnOnce(&D, &mut ForwardProgress) -> Result<(), SyncError> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(progress.is_cancelled()));
        let mut forward = ForwardProgress {
            tx,
            cancelled: cancelled.clone(),
        };

        let device = self.inner.clone();
        let worker = task::spawn_blocking(move || op(&*device, &mut forward));

        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Start(total) => progress.start(total),
                ProgressEvent::Advance(bytes) => progress.advance(bytes),
                ProgressEvent::Stop => progress.stop(),
            }
            cancelled.store(progress.is_cancelled(), Ordering::SeqCst);
        }

        worker
            .await
            .map_err(|e| SyncError::new(SyncErrorCategory::Other, worker_failed(&e).to_string()))?
    }
}

#[async_trait]
impl<D: BlockingDevice> Device for Blocking<D> {
    fn serial(&self) -> &str {
        self.inner.serial()
    }

    async fn execute_shell(&self, command: &str) -> Result<String, TransportError> {
        let device = self.inner.clone();
        let command = command.to_owned();

        task::spawn_blocking(move || device.execute_shell(&command))
            .await
            .map_err(|e| worker_failed(&e))?
    }

    async fn execute_streaming(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
    ) -> Result<(), TransportError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut forward = ForwardLines {
            tx,
            cancelled: cancelled.clone(),
        };

        let device = self.inner.clone();
        let command = command.to_owned();
        let worker =
            task::spawn_blocking(move || device.execute_streaming(&command, &mut forward));

        while let Some(line) = rx.recv().await {
            receiver.line(&line);
            if receiver.is_cancelled() {
                cancelled.store(true, Ordering::SeqCst);
            }
        }

        worker.await.map_err(|e| worker_failed(&e))?
    }

    async fn is_root(&self) -> Result<bool, TransportError> {
        let device = self.inner.clone();
        task::spawn_blocking(move || device.is_root())
            .await
            .map_err(|e| worker_failed(&e))?
    }

    async fn push_file(
        &self,
        local: &Path,
        remote: &str,
        progress: &mut dyn SyncProgress,
    ) -> Result<(), SyncError> {
        let local: PathBuf = local.to_path_buf();
        let remote = remote.to_owned();
        self.run_sync(progress, move |device, forward| {
            device.push_file(&local, &remote, forward)
        })
        .await
    }

    async fn pull_file(
        &self,
        remote: &str,
        local: &Path,
        progress: &mut dyn SyncProgress,
    ) -> Result<(), SyncError> {
        let local: PathBuf = local.to_path_buf();
        let remote = remote.to_owned();
        self.run_sync(progress, move |device, forward| {
            device.pull_file(&remote, &local, forward)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct ChunkedDevice {
        commands: Mutex<Vec<String>>,
    }

    impl BlockingDevice for ChunkedDevice {
        fn serial(&self) -> &str {
            "emulator-5554"
        }

        fn execute_shell(&self, command: &str) -> Result<String, TransportError> {
            if let Ok(mut commands) = self.commands.lock() {
                commands.push(command.to_owned());
            }
            Ok("line one\r\nline two\n".to_owned())
        }

        fn is_root(&self) -> Result<bool, TransportError> {
            Ok(false)
        }

        fn push_file(
            &self,
            _local: &Path,
            _remote: &str,
            progress: &mut dyn SyncProgress,
        ) -> Result<(), SyncError> {
            progress.start(30);
            for _ in 0..3 {
                // Give the awaiting side a chance to flip the flag.
                std::thread::sleep(std::time::Duration::from_millis(20));
                if progress.is_cancelled() {
                    return Err(SyncError::cancelled());
                }
                progress.advance(10);
            }
            progress.stop();
            Ok(())
        }

        fn pull_file(
            &self,
            _remote: &str,
            _local: &Path,
            _progress: &mut dyn SyncProgress,
        ) -> Result<(), SyncError> {
            Err(SyncError::permission("remote object doesn't exist"))
        }
    }

    #[derive(Default)]
    struct Counting {
        advanced: u64,
        stopped: bool,
        cancel_after: Option<u64>,
    }

    impl SyncProgress for Counting {
        fn advance(&mut self, bytes: u64) {
            self.advanced += bytes;
        }

        fn is_cancelled(&self) -> bool {
            self.cancel_after.is_some_and(|limit| self.advanced >= limit)
        }

        fn stop(&mut self) {
            self.stopped = true;
        }
    }

    fn device() -> Blocking<ChunkedDevice> {
        Blocking::new(ChunkedDevice {
            commands: Mutex::new(vec![]),
        })
    }

    #[tokio::test]
    async fn shell_runs_on_worker_pool() {
        let device = device();
        let output = device.execute_shell("id").await;
        assert_eq!(output, Ok("line one\r\nline two\n".to_owned()));
        assert_eq!(
            device.get_ref().commands.lock().map(|c| c.clone()).ok(),
            Some(vec!["id".to_owned()])
        );
    }

    #[tokio::test]
    async fn streaming_lines_reach_caller() {
        let device = device();
        let mut lines = Vec::<String>::new();
        device
            .execute_streaming("logcat", &mut lines)
            .await
            .unwrap();
        assert_eq!(lines, vec!["line one", "line two"]);
    }

    #[tokio::test]
    async fn progress_is_forwarded() {
        let device = device();
        let mut progress = Counting::default();
        device
            .push_file(Path::new("a.bin"), "/sdcard/a.bin", &mut progress)
            .await
            .unwrap();
        assert_eq!(progress.advanced, 30);
        assert!(progress.stopped);
    }

    #[tokio::test]
    async fn cancellation_reaches_worker() {
        let device = device();
        let mut progress = Counting {
            cancel_after: Some(10),
            ..Default::default()
        };
        let result = device
            .push_file(Path::new("a.bin"), "/sdcard/a.bin", &mut progress)
            .await;
        assert_eq!(result, Err(SyncError::cancelled()));
        assert!(progress.advanced < 30);
    }

    #[tokio::test]
    async fn sync_errors_keep_category() {
        let device = device();
        let mut progress = Counting::default();
        let result = device
            .pull_file("/data/data/com.example/a", Path::new("a"), &mut progress)
            .await;
        assert!(result.is_err_and(|e| e.is_permission()));
    }
}
