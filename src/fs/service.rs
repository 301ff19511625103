use std::sync::Arc;
use tokio::sync::Mutex;

use super::DeviceFileSystem;
use crate::{config::Config, device::Device};

/// Keeps one [`DeviceFileSystem`] per connected device.
///
/// A device handle that changes for the same serial is a reconnect: its
/// file system, and with it every cached capability, is rebuilt.
pub struct DeviceFileSystemService {
    config: Config,
    file_systems: Mutex<Vec<Arc<DeviceFileSystem>>>,
}

impl DeviceFileSystemService {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            file_systems: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the set of connected devices and returns the matching file
    /// systems, in the order of `devices`.
    pub async fn update_devices(
        &self,
        devices: Vec<Arc<dyn Device>>,
    ) -> Vec<Arc<DeviceFileSystem>> {
        let mut file_systems = self.file_systems.lock().await;

        let updated: Vec<_> = devices
            .into_iter()
            .map(|device| {
                let existing = file_systems.iter().find(|fs| {
                    fs.serial() == device.serial()
                        && std::ptr::addr_eq(Arc::as_ptr(fs.device()), Arc::as_ptr(&device))
                });

                match existing {
                    Some(fs) => fs.clone(),
                    None => {
                        debug!("{}: device connected", device.serial());
                        Arc::new(DeviceFileSystem::new(device, self.config.clone()))
                    }
                }
            })
            .collect();

        for gone in file_systems
            .iter()
            .filter(|fs| !updated.iter().any(|u| Arc::ptr_eq(u, fs)))
        {
            debug!("{}: device disconnected", gone.serial());
        }

        *file_systems = updated.clone();
        updated
    }

    pub async fn devices(&self) -> Vec<Arc<DeviceFileSystem>> {
        self.file_systems.lock().await.clone()
    }

    pub async fn get(&self, serial: &str) -> Option<Arc<DeviceFileSystem>> {
        self.file_systems
            .lock()
            .await
            .iter()
            .find(|fs| fs.serial() == serial)
            .cloned()
    }
}
