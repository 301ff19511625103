//! Uploads and downloads over the sync channel.
//!
//! The sync channel runs as the shell user, so it cannot reach another
//! application's data or root-only paths. When such a transfer is refused
//! the file is staged in the temp directory and moved there or back with a
//! `su` or `run-as` command.

mod progress;

use std::{path::Path, sync::Arc};

use crate::{
    capabilities::DeviceCapabilities,
    device::SyncProgress,
    error::{Error, Result, SyncError, SyncErrorCategory},
    operations::FileOperations,
    shell::{Privilege, ShellCommandBuilder, ShellRunner},
    temp::ScopedRemoteFile,
};

pub use progress::{TransferProgress, TransferProgressListener};
use progress::ThrottledProgress;

fn sync_error(error: SyncError) -> Error {
    match error.category {
        SyncErrorCategory::Cancelled => Error::Cancelled,
        _ => Error::SyncTransfer(error),
    }
}

#[derive(Clone)]
pub struct FileTransfer {
    runner: ShellRunner,
    capabilities: Arc<DeviceCapabilities>,
    operations: FileOperations,
}

impl FileTransfer {
    pub fn new(
        runner: ShellRunner,
        capabilities: Arc<DeviceCapabilities>,
        operations: FileOperations,
    ) -> Self {
        Self {
            runner,
            capabilities,
            operations,
        }
    }

    fn throttle<'a>(
        &self,
        listener: &'a mut dyn TransferProgressListener,
        total: u64,
    ) -> ThrottledProgress<'a> {
        ThrottledProgress::new(listener, self.runner.config().progress_interval, total)
    }

    async fn pull(
        &self,
        remote: &str,
        local: &Path,
        progress: &mut dyn SyncProgress,
    ) -> Result<()> {
        self.runner
            .device()
            .pull_file(remote, local, progress)
            .await
            .map_err(sync_error)
    }

    async fn push(
        &self,
        local: &Path,
        remote: &str,
        progress: &mut dyn SyncProgress,
    ) -> Result<()> {
        self.runner
            .device()
            .push_file(local, remote, progress)
            .await
            .map_err(sync_error)
    }

    /// Only an elevated copy can get around a refused transfer.
    async fn can_use_temp_location(&self, run_as: Option<&str>) -> Result<bool> {
        Ok(run_as.is_some() || self.capabilities.needs_su_for_root().await?)
    }

    async fn create_temp_file(&self) -> Result<ScopedRemoteFile> {
        let path = self.operations.create_temp_file().await?;
        Ok(ScopedRemoteFile::new(self.runner.clone(), path, Privilege::Default))
    }

    /// Copies `remote` to `local`. `size` comes from the listing and is the
    /// total reported to `listener`.
    pub async fn download_file(
        &self,
        remote: &str,
        size: u64,
        local: &Path,
        run_as: Option<&str>,
        listener: &mut dyn TransferProgressListener,
    ) -> Result<()> {
        let mut progress = self.throttle(listener, size);
        progress.begin();

        let pulled = self.pull(remote, local, &mut progress).await;
        let result = match pulled {
            Err(err) if err.is_permission_denied() => {
                match self.can_use_temp_location(run_as).await {
                    Ok(true) => {
                        debug!("pull of {} refused ({}), going through a temp file", remote, err);
                        self.download_via_temp(remote, local, run_as, &mut progress).await
                    }
                    Ok(false) => Err(err),
                    Err(probe) => Err(probe),
                }
            }
            other => other,
        };

        progress.finish();
        result
    }

    /// Elevated copy of `remote` into a temp file, then a pull of that file.
    pub async fn download_file_via_temp_location(
        &self,
        remote: &str,
        size: u64,
        local: &Path,
        run_as: Option<&str>,
        listener: &mut dyn TransferProgressListener,
    ) -> Result<()> {
        let mut progress = self.throttle(listener, size);
        progress.begin();
        let result = self.download_via_temp(remote, local, run_as, &mut progress).await;
        progress.finish();
        result
    }

    async fn download_via_temp(
        &self,
        remote: &str,
        local: &Path,
        run_as: Option<&str>,
        progress: &mut dyn SyncProgress,
    ) -> Result<()> {
        let privilege = self.capabilities.privilege_for(run_as).await?;
        let temp = self.create_temp_file().await?;

        let result = match self.copy_to_temp(remote, temp.path(), &privilege).await {
            Ok(()) => self.pull(temp.path(), local, progress).await,
            Err(err) => Err(err),
        };

        temp.close().await;
        result
    }

    /// An application cannot write to the temp directory, so its output is
    /// redirected there by the shell user instead.
    async fn copy_to_temp(&self, remote: &str, temp: &str, privilege: &Privilege) -> Result<()> {
        match privilege {
            Privilege::RunAs(_) => {
                let command = ShellCommandBuilder::with_privilege(privilege)
                    .text("cat ")
                    .escaped_path(remote)
                    .build_redirected(temp);
                self.runner.check(self.runner.execute(&command).await?)?;
                Ok(())
            }
            _ => self.operations.copy_with_privilege(remote, temp, privilege).await,
        }
    }

    /// Copies `local` to `remote`, with the local file size as total.
    pub async fn upload_file(
        &self,
        local: &Path,
        remote: &str,
        run_as: Option<&str>,
        listener: &mut dyn TransferProgressListener,
    ) -> Result<()> {
        let size = tokio::fs::metadata(local).await?.len();
        let mut progress = self.throttle(listener, size);
        progress.begin();

        let result = self.upload(local, remote, run_as, &mut progress).await;

        progress.finish();
        result
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        run_as: Option<&str>,
        progress: &mut dyn SyncProgress,
    ) -> Result<()> {
        if run_as.is_some() {
            return self.upload_via_temp(local, remote, run_as, progress).await;
        }

        if !self.capabilities.needs_su_for_root().await? {
            return self.push(local, remote, progress).await;
        }

        // A `touch` the shell user is allowed to do means the push will be
        // allowed too.
        if !self.operations.touch(remote, &Privilege::Default).await? {
            debug!("{} is not writable by the shell user, going through a temp file", remote);
            return self.upload_via_temp(local, remote, run_as, progress).await;
        }

        let pushed = self.push(local, remote, progress).await;
        match pushed {
            Err(err) if err.is_permission_denied() => {
                warn!("push to {} refused ({}), going through a temp file", remote, err);
                self.upload_via_temp(local, remote, run_as, progress).await
            }
            other => other,
        }
    }

    /// Push of `local` into a temp file, then an elevated copy to `remote`.
    pub async fn upload_file_via_temp_location(
        &self,
        local: &Path,
        remote: &str,
        run_as: Option<&str>,
        listener: &mut dyn TransferProgressListener,
    ) -> Result<()> {
        let size = tokio::fs::metadata(local).await?.len();
        let mut progress = self.throttle(listener, size);
        progress.begin();
        let result = self.upload_via_temp(local, remote, run_as, &mut progress).await;
        progress.finish();
        result
    }

    async fn upload_via_temp(
        &self,
        local: &Path,
        remote: &str,
        run_as: Option<&str>,
        progress: &mut dyn SyncProgress,
    ) -> Result<()> {
        let privilege = self.capabilities.privilege_for(run_as).await?;
        let temp = self.create_temp_file().await?;

        let result = match self.push(local, temp.path(), progress).await {
            Ok(()) => {
                self.operations
                    .copy_with_privilege(temp.path(), remote, &privilege)
                    .await
            }
            Err(err) => Err(err),
        };

        temp.close().await;
        result
    }
}
