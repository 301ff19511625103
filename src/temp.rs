use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;

use crate::shell::{Privilege, ShellCommandBuilder, ShellRunner};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A name no other probe or transfer of this process will use.
pub(crate) fn unique_name(prefix: &str) -> String {
    format!(
        "{prefix}{:x}{:04x}",
        Utc::now().timestamp_millis(),
        NEXT_ID.fetch_add(1, Ordering::SeqCst)
    )
}

/// Device-side file that lives for the duration of one probe or transfer.
///
/// Call [`close`](Self::close) on every path. If the value is dropped while
/// still armed (the operation was cancelled), deletion is spawned on the
/// current runtime and its outcome only logged.
pub(crate) struct ScopedRemoteFile {
    runner: ShellRunner,
    path: String,
    privilege: Privilege,
    armed: bool,
}

impl ScopedRemoteFile {
    pub fn new<T: Into<String>>(runner: ShellRunner, path: T, privilege: Privilege) -> Self {
        Self {
            runner,
            path: path.into(),
            privilege,
            armed: true,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The file is already gone, skip deletion.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub async fn close(mut self) {
        if self.armed {
            self.armed = false;
            delete(&self.runner, &self.path, &self.privilege).await;
        }
    }
}

async fn delete(runner: &ShellRunner, path: &str, privilege: &Privilege) {
    let command = ShellCommandBuilder::with_privilege(privilege)
        .text("rm ")
        .escaped_path(path)
        .build();

    match runner.execute(&command).await {
        Ok(result) if result.is_error => {
            warn!("failed to delete temporary file {}: {:?}", path, result.output);
        }
        Ok(_) => trace!("deleted temporary file {}", path),
        Err(err) => warn!("failed to delete temporary file {}: {}", path, err),
    }
}

impl Drop for ScopedRemoteFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        if let Ok(handle) = Handle::try_current() {
            let runner = self.runner.clone();
            let path = self.path.clone();
            let privilege = self.privilege.clone();

            let _ = handle.spawn(async move {
                delete(&runner, &path, &privilege).await;
            });
        } else {
            warn!("leaking temporary file {}", self.path);
        }
    }
}
