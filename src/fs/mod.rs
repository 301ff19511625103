//! The file tree of one device and the registry of connected devices.

mod entry;
mod service;

use std::sync::Arc;

use crate::{
    capabilities::DeviceCapabilities,
    config::Config,
    device::Device,
    error::{Error, Result},
    listing::FileListing,
    operations::FileOperations,
    shell::ShellRunner,
    transfer::FileTransfer,
};

pub use entry::{FileEntry, Strategy, PACKAGE_DATA_DIRECTORY};
pub use service::DeviceFileSystemService;

/// Per-device services shared by every entry of the tree.
pub(crate) struct Services {
    runner: ShellRunner,
    capabilities: Arc<DeviceCapabilities>,
    listing: FileListing,
    operations: FileOperations,
    transfer: FileTransfer,
}

impl Services {
    fn new(device: Arc<dyn Device>, config: Config) -> Self {
        let runner = ShellRunner::new(device, Arc::new(config));
        let capabilities = Arc::new(DeviceCapabilities::new(runner.clone()));
        let listing = FileListing::new(runner.clone(), capabilities.clone());
        let operations = FileOperations::new(runner.clone(), capabilities.clone());
        let transfer = FileTransfer::new(runner.clone(), capabilities.clone(), operations.clone());

        Self {
            runner,
            capabilities,
            listing,
            operations,
            transfer,
        }
    }

    fn serial(&self) -> &str {
        self.runner.device().serial()
    }
}

/// File system of one connected device.
///
/// Capabilities are probed lazily and kept as long as this value lives;
/// a reconnected device gets a new one.
pub struct DeviceFileSystem {
    services: Arc<Services>,
    root: Arc<FileEntry>,
}

impl DeviceFileSystem {
    pub fn new(device: Arc<dyn Device>, config: Config) -> Self {
        let services = Arc::new(Services::new(device, config));
        let root = FileEntry::root(services.clone());
        Self { services, root }
    }

    pub fn serial(&self) -> &str {
        self.services.serial()
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        self.services.runner.device()
    }

    pub fn config(&self) -> &Config {
        self.services.runner.config()
    }

    pub fn root(&self) -> Arc<FileEntry> {
        self.root.clone()
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.services.capabilities
    }

    pub fn listing(&self) -> &FileListing {
        &self.services.listing
    }

    pub fn operations(&self) -> &FileOperations {
        &self.services.operations
    }

    pub fn transfer(&self) -> &FileTransfer {
        &self.services.transfer
    }

    /// Walks down from the root, listing each directory on the way.
    pub async fn get_entry(&self, path: &str) -> Result<Arc<FileEntry>> {
        let mut current = self.root();

        for name in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .list_children()
                .await?
                .into_iter()
                .find(|child| child.name() == name)
                .ok_or_else(|| Error::NotFound(path.to_owned()))?;
        }

        Ok(current)
    }
}
