//! File system client for Android devices driven entirely through the
//! device shell and the sync channel.
//!
//! Start from a [`DeviceFileSystem`] (or a [`DeviceFileSystemService`] for
//! every connected device) and walk [`FileEntry`] nodes from its root.

#[macro_use]
extern crate log;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate async_trait;

pub mod capabilities;
mod config;
/// Device handle traits
pub mod device;
mod error;
pub mod fs;
pub mod listing;
pub mod operations;
pub mod shell;
mod temp;
pub mod transfer;

#[cfg(test)]
mod mock;

pub use capabilities::{Capability, DeviceCapabilities};
pub use config::{Config, DEFAULT_PROBE_DIRECTORY, DEFAULT_TEMP_DIRECTORY, MIN_PROGRESS_INTERVAL};
pub use device::{Blocking, BlockingDevice, Device, ShellOutputReceiver, SyncProgress};
pub use error::{Error, Result, SyncError, SyncErrorCategory, TransportError};
pub use fs::{DeviceFileSystem, DeviceFileSystemService, FileEntry, Strategy};
pub use listing::{EntryKind, ListingEntry, Mode};
pub use transfer::{TransferProgress, TransferProgressListener};
