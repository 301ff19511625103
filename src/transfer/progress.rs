use std::time::{Duration, Instant};

use crate::{config::MIN_PROGRESS_INTERVAL, device::SyncProgress};

/// Snapshot of one transfer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    /// Size from the listing (downloads) or the local file (uploads).
    pub total_bytes: u64,
    pub cancelled: bool,
}

/// Receives the progress of a transfer and may cancel it.
pub trait TransferProgressListener: Send {
    fn progress(&mut self, progress: TransferProgress);

    /// Polled by the transport between chunks.
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<F> TransferProgressListener for F
where
    F: FnMut(TransferProgress) + Send,
{
    fn progress(&mut self, progress: TransferProgress) {
        self(progress);
    }
}

/// Forwards transport progress to a listener at most once per interval,
/// plus the first and the last report. The interval is never shorter than
/// [`MIN_PROGRESS_INTERVAL`].
pub(crate) struct ThrottledProgress<'a> {
    listener: &'a mut dyn TransferProgressListener,
    interval: Duration,
    total: u64,
    transferred: u64,
    last_report: Option<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(
        listener: &'a mut dyn TransferProgressListener,
        interval: Duration,
        total: u64,
    ) -> Self {
        Self {
            listener,
            interval: interval.max(MIN_PROGRESS_INTERVAL),
            total,
            transferred: 0,
            last_report: None,
        }
    }

    fn report(&mut self) {
        let progress = TransferProgress {
            bytes_transferred: self.transferred,
            total_bytes: self.total,
            cancelled: self.listener.is_cancelled(),
        };
        trace!("transfer progress {}/{}", progress.bytes_transferred, progress.total_bytes);
        self.listener.progress(progress);
        self.last_report = Some(Instant::now());
    }

    /// Reports zero bytes.
    pub fn begin(&mut self) {
        self.transferred = 0;
        self.report();
    }

    /// Reports the final count whatever the interval.
    pub fn finish(&mut self) {
        self.report();
    }
}

impl SyncProgress for ThrottledProgress<'_> {
    /// The transport total is ignored; it is zero for most pulls.
    fn start(&mut self, _total: u64) {
        // A fallback transfer starts over.
        self.transferred = 0;
    }

    fn advance(&mut self, bytes: u64) {
        self.transferred = self.transferred.saturating_add(bytes);
        let due = self
            .last_report
            .map_or(true, |last| last.elapsed() >= self.interval);
        if due {
            self.report();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.listener.is_cancelled()
    }
}
