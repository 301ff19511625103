use std::{
    fmt,
    path::Path,
    sync::{Arc, Weak},
};

use super::Services;
use crate::{
    error::Result,
    listing::{join_path, EntryKind, ListingEntry},
    operations::validate_name,
    transfer::TransferProgressListener,
};

/// Directory of application data, unreadable by the shell user.
pub const PACKAGE_DATA_DIRECTORY: &str = "/data/data";

/// How the operations of an entry reach the device.
#[derive(Clone)]
pub enum Strategy {
    /// Decided per call from the device capabilities and the path
    Default,
    /// Commands run as the shell user (or root through `su`), or as the
    /// given package
    Direct { run_as: Option<String> },
    /// Operations are those of another entry
    Forwarding(Arc<FileEntry>),
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Direct { run_as } => f.debug_struct("Direct").field("run_as", run_as).finish(),
            Self::Forwarding(target) => f
                .debug_tuple("Forwarding")
                .field(&target.full_path())
                .finish(),
        }
    }
}

enum MountPoint<'a> {
    Direct(Option<&'a str>),
    /// Children are the installed packages
    PackageDirectory,
}

/// Node of the file tree of one device.
///
/// Children are fetched on demand and every call gives a fresh set; nothing
/// is cached on the node.
pub struct FileEntry {
    services: Arc<Services>,
    parent: Weak<FileEntry>,
    entry: ListingEntry,
    strategy: Strategy,
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntry")
            .field("entry", &self.entry)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl FileEntry {
    pub(crate) fn root(services: Arc<Services>) -> Arc<Self> {
        Arc::new(Self {
            services,
            parent: Weak::new(),
            entry: ListingEntry::root(),
            strategy: Strategy::Default,
        })
    }

    fn child(self: &Arc<Self>, entry: ListingEntry, strategy: Strategy) -> Arc<Self> {
        Arc::new(Self {
            services: self.services.clone(),
            parent: Arc::downgrade(self),
            entry,
            strategy,
        })
    }

    pub fn listing(&self) -> &ListingEntry {
        &self.entry
    }

    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn full_path(&self) -> &str {
        self.entry.full_path()
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// `None` for the root, or when the parent was dropped.
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.upgrade()
    }

    /// The entry whose strategy applies: the end of the forwarding chain.
    fn effective(&self) -> &Self {
        let mut entry = self;
        while let Strategy::Forwarding(target) = &entry.strategy {
            entry = &**target;
        }
        entry
    }

    fn run_as(&self) -> Option<&str> {
        match &self.strategy {
            Strategy::Direct { run_as } => run_as.as_deref(),
            _ => None,
        }
    }

    fn child_strategy(&self) -> Strategy {
        match &self.strategy {
            Strategy::Direct { run_as } => Strategy::Direct {
                run_as: run_as.clone(),
            },
            _ => Strategy::Default,
        }
    }

    /// Resolved on every call, capabilities may still be unknown when the
    /// entry is created.
    async fn mount_point(&self) -> Result<MountPoint<'_>> {
        let entry = self.effective();
        if matches!(entry.strategy, Strategy::Default)
            && entry.full_path() == PACKAGE_DATA_DIRECTORY
            && !self.services.capabilities.has_root_access().await?
        {
            return Ok(MountPoint::PackageDirectory);
        }
        Ok(MountPoint::Direct(entry.run_as()))
    }

    /// Package to run commands as, if any, for everything but listing.
    async fn operation_run_as(&self) -> Result<Option<&str>> {
        Ok(match self.mount_point().await? {
            MountPoint::Direct(run_as) => run_as,
            MountPoint::PackageDirectory => None,
        })
    }

    pub async fn list_children(self: &Arc<Self>) -> Result<Vec<Arc<Self>>> {
        let target = self.effective();

        match self.mount_point().await? {
            MountPoint::PackageDirectory => {
                debug!("{}: listing packages for {}", self.services.serial(), target.full_path());
                let packages = self.services.listing.list_packages().await?;

                Ok(packages
                    .into_iter()
                    .map(|package| {
                        let entry = ListingEntry::new(
                            join_path(target.full_path(), &package),
                            EntryKind::Directory,
                        );
                        let strategy = Strategy::Direct {
                            run_as: Some(package),
                        };
                        let package_root = self.child(entry.clone(), strategy);
                        self.child(entry, Strategy::Forwarding(package_root))
                    })
                    .collect())
            }
            MountPoint::Direct(run_as) => {
                let strategy = target.child_strategy();
                Ok(self
                    .services
                    .listing
                    .list_children(target.full_path(), run_as)
                    .await?
                    .into_iter()
                    .map(|entry| self.child(entry, strategy.clone()))
                    .collect())
            }
        }
    }

    /// Whether this symbolic link points to a directory. Other entries,
    /// and links already resolved, answer from their own kind.
    pub async fn is_symlink_to_directory(&self) -> Result<bool> {
        if self.entry.kind() != EntryKind::FileLink {
            return Ok(self.entry.is_directory());
        }
        let run_as = self.operation_run_as().await?;
        self.services
            .listing
            .is_symlink_to_directory(self.effective().full_path(), run_as)
            .await
    }

    /// This entry, listed as [`EntryKind::DirectoryLink`] if it is a link to
    /// a directory. Anything else comes back as it is.
    pub async fn resolve_link(self: &Arc<Self>) -> Result<Arc<Self>> {
        if self.entry.kind() != EntryKind::FileLink || !self.is_symlink_to_directory().await? {
            return Ok(self.clone());
        }

        Ok(Arc::new(Self {
            services: self.services.clone(),
            parent: self.parent.clone(),
            entry: self.entry.clone().into_directory_link(),
            strategy: self.strategy.clone(),
        }))
    }

    /// Deletes the entry, recursively for directories.
    pub async fn delete(&self) -> Result<()> {
        let run_as = self.operation_run_as().await?;
        let path = self.effective().full_path();
        let operations = &self.services.operations;

        if self.entry.kind() == EntryKind::Directory {
            operations.delete_recursive(path, run_as).await
        } else {
            operations.delete_file(path, run_as).await
        }
    }

    pub async fn create_new_file(&self, name: &str) -> Result<String> {
        let run_as = self.operation_run_as().await?;
        self.services
            .operations
            .create_new_file(self.effective().full_path(), name, run_as)
            .await
    }

    pub async fn create_new_directory(&self, name: &str) -> Result<String> {
        let run_as = self.operation_run_as().await?;
        self.services
            .operations
            .create_new_directory(self.effective().full_path(), name, run_as)
            .await
    }

    /// Copies this file to `local`.
    pub async fn download_file(
        &self,
        local: &Path,
        listener: &mut dyn TransferProgressListener,
    ) -> Result<()> {
        let run_as = self.operation_run_as().await?;
        self.services
            .transfer
            .download_file(
                self.effective().full_path(),
                self.entry.byte_size(),
                local,
                run_as,
                listener,
            )
            .await
    }

    /// Copies `local` into this directory as `name`.
    pub async fn upload_file(
        &self,
        local: &Path,
        name: &str,
        listener: &mut dyn TransferProgressListener,
    ) -> Result<()> {
        validate_name(name)?;
        let run_as = self.operation_run_as().await?;
        let remote = join_path(self.effective().full_path(), name);
        self.services
            .transfer
            .upload_file(local, &remote, run_as, listener)
            .await
    }
}
