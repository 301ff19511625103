//! Directory listings: `ls -al` output parsing and the service that runs it.

mod entry;
mod parser;

use std::sync::Arc;

use crate::{
    capabilities::DeviceCapabilities,
    error::Result,
    shell::{ShellCommandBuilder, ShellRunner},
};

pub use entry::{EntryKind, ListingEntry, Mode};
pub use parser::{
    directory_argument, join_path, parse_line, parse_listing, parse_packages, unescape_name,
};

/// Lists directories of one device.
#[derive(Clone)]
pub struct FileListing {
    runner: ShellRunner,
    capabilities: Arc<DeviceCapabilities>,
}

impl FileListing {
    pub fn new(runner: ShellRunner, capabilities: Arc<DeviceCapabilities>) -> Self {
        Self {
            runner,
            capabilities,
        }
    }

    /// Entries of the directory at `path`, as the package `run_as` when set.
    ///
    /// Lines that cannot be parsed are skipped. A failed command that still
    /// printed some entries gives those entries.
    pub async fn list_children(
        &self,
        path: &str,
        run_as: Option<&str>,
    ) -> Result<Vec<ListingEntry>> {
        let privilege = self.capabilities.privilege_for(run_as).await?;
        // Guessing wrong here would hand out paths that name other files.
        let escaping_ls = self.capabilities.has_escaping_ls().await?;

        let command = ShellCommandBuilder::with_privilege(&privilege)
            .text("ls -al ")
            .escaped_path(&directory_argument(path))
            .build();
        let result = self.runner.execute(&command).await?;
        let entries = parse_listing(path, &result.output, escaping_ls);

        if result.is_error {
            if entries.is_empty() {
                self.runner.check(result)?;
            } else {
                warn!(
                    "{}: listing of {} failed after {} entries",
                    self.runner.device().serial(),
                    path,
                    entries.len()
                );
            }
        }

        Ok(entries)
    }

    /// Whether the link at `path` resolves to a directory.
    pub async fn is_symlink_to_directory(&self, path: &str, run_as: Option<&str>) -> Result<bool> {
        let privilege = self.capabilities.privilege_for(run_as).await?;
        let command = ShellCommandBuilder::with_privilege(&privilege)
            .text("ls -l -d ")
            .escaped_path(&directory_argument(path))
            .build();

        // Dangling links and plain files print an error line instead.
        let result = self.runner.execute_unchecked(&command).await?;
        Ok(result.first_line().is_some_and(|line| line.starts_with('d')))
    }

    /// Ids of the packages installed on the device.
    pub async fn list_packages(&self) -> Result<Vec<String>> {
        let command = ShellCommandBuilder::new().text("pm list packages").build();
        let result = self.runner.throw_if_error(self.runner.execute(&command).await?)?;
        Ok(parse_packages(&result.output))
    }
}
