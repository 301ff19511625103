//! Per-device detection of which shell commands and flags are available.
//!
//! Android shells range from the old `toolbox` (no `test`, no `touch`, no
//! `rm -f`) to `toybox`, and `su` may or may not exist. Each capability is
//! probed with a real command the first time it is asked for and the answer
//! is kept for the lifetime of the device connection.

use regex::Regex;
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, LazyLock},
};
use tokio::sync::{Mutex, OnceCell};

use crate::{
    error::{Error, Result},
    shell::{Privilege, ShellCommand, ShellCommandBuilder, ShellRunner},
    temp::{unique_name, ScopedRemoteFile},
};

static LOGCAT_EPOCH_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\d+\s").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    TestCommand,
    RmForceFlag,
    TouchCommand,
    SuRootCommand,
    Root,
    CpCommand,
    MkTempCommand,
    LogcatEpochModifier,
    EscapingLs,
}

impl Capability {
    pub const ALL: [Self; 9] = [
        Self::TestCommand,
        Self::RmForceFlag,
        Self::TouchCommand,
        Self::SuRootCommand,
        Self::Root,
        Self::CpCommand,
        Self::MkTempCommand,
        Self::LogcatEpochModifier,
        Self::EscapingLs,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TestCommand => "testCommand",
            Self::RmForceFlag => "rmForceFlag",
            Self::TouchCommand => "touchCommand",
            Self::SuRootCommand => "suRootCommand",
            Self::Root => "isRoot",
            Self::CpCommand => "cpCommand",
            Self::MkTempCommand => "mkTempCommand",
            Self::LogcatEpochModifier => "logcatEpochModifier",
            Self::EscapingLs => "escapingLs",
        }
    }
}

/// Memoized capability flags of one device.
///
/// Concurrent callers asking for the same capability wait for the probe in
/// flight instead of starting their own, so each probe command runs once.
pub struct DeviceCapabilities {
    runner: ShellRunner,
    cache: Mutex<HashMap<Capability, Arc<OnceCell<bool>>>>,
    probe_directory: OnceCell<()>,
}

fn command(text: &str, path: &str) -> ShellCommand {
    ShellCommandBuilder::new()
        .text(text)
        .escaped_path(path)
        .build()
}

impl DeviceCapabilities {
    pub fn new(runner: ShellRunner) -> Self {
        Self {
            runner,
            cache: Mutex::new(HashMap::new()),
            probe_directory: OnceCell::new(),
        }
    }

    /// Value of `capability` if it was already probed.
    pub async fn cached(&self, capability: Capability) -> Option<bool> {
        self.cell(capability).await.get().copied()
    }

    async fn cell(&self, capability: Capability) -> Arc<OnceCell<bool>> {
        self.cache
            .lock()
            .await
            .entry(capability)
            .or_default()
            .clone()
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, capability: Capability, value: bool) {
        let _ = self.cell(capability).await.set(value);
    }

    async fn memoize<F>(&self, capability: Capability, probe: F) -> Result<bool>
    where
        F: Future<Output = Result<bool>>,
    {
        let serial = self.runner.device().serial();
        let cell = self.cell(capability).await;
        let value = cell
            .get_or_try_init(|| async move {
                match probe.await {
                    Ok(supported) => {
                        debug!("{}: {} = {}", serial, capability.as_str(), supported);
                        Ok(supported)
                    }
                    Err(err) if err.is_probe_negative() => {
                        debug!("{}: {} probe failed: {}", serial, capability.as_str(), err);
                        Ok(false)
                    }
                    Err(err) => Err(err),
                }
            })
            .await?;

        Ok(*value)
    }

    fn probe_path(&self, name: &str) -> String {
        format!("{}/{}", self.runner.config().probe_directory, name)
    }

    async fn ensure_probe_directory(&self) -> Result<()> {
        self.probe_directory
            .get_or_try_init(|| async {
                let result = self
                    .runner
                    .execute(&command("mkdir -p ", &self.runner.config().probe_directory))
                    .await?;
                self.runner.check(result)
            })
            .await
            .map(|_| ())
    }

    /// Creates an empty probe file without relying on `touch`.
    async fn create_probe_file(&self, name: &str) -> Result<ScopedRemoteFile> {
        self.ensure_probe_directory().await?;

        let path = self.probe_path(name);
        let result = self.runner.execute(&command("echo >", &path)).await?;
        self.runner.check(result)?;

        Ok(ScopedRemoteFile::new(
            self.runner.clone(),
            path,
            Privilege::Default,
        ))
    }

    pub async fn supports_test_command(&self) -> Result<bool> {
        self.memoize(Capability::TestCommand, self.probe_test_command()).await
    }

    pub async fn supports_rm_force_flag(&self) -> Result<bool> {
        self.memoize(Capability::RmForceFlag, self.probe_rm_force_flag()).await
    }

    pub async fn supports_touch_command(&self) -> Result<bool> {
        self.memoize(Capability::TouchCommand, self.probe_touch_command()).await
    }

    pub async fn supports_su_root_command(&self) -> Result<bool> {
        self.memoize(Capability::SuRootCommand, self.probe_su_root_command()).await
    }

    /// Whether `adbd` itself runs as root.
    pub async fn is_root(&self) -> Result<bool> {
        self.memoize(Capability::Root, self.probe_is_root()).await
    }

    pub async fn supports_cp_command(&self) -> Result<bool> {
        self.memoize(Capability::CpCommand, self.probe_cp_command()).await
    }

    /// Whether `ls` prints special characters of file names escaped
    /// (`a\ b` instead of `a b`).
    pub async fn has_escaping_ls(&self) -> Result<bool> {
        self.memoize(Capability::EscapingLs, self.probe_escaping_ls()).await
    }

    pub async fn supports_mktemp_command(&self) -> Result<bool> {
        self.memoize(Capability::MkTempCommand, self.probe_mktemp_command()).await
    }

    /// Whether `logcat` understands `-v epoch`.
    pub async fn supports_logcat_epoch_modifier(&self) -> Result<bool> {
        self.memoize(Capability::LogcatEpochModifier, self.probe_logcat_epoch_modifier()).await
    }

    /// Wrapper needed to run a command for `run_as`, or as the most
    /// privileged user available when there is no package.
    pub async fn privilege_for(&self, run_as: Option<&str>) -> Result<Privilege> {
        if let Some(package) = run_as {
            return Ok(Privilege::run_as(package));
        }

        if !self.is_root().await? && self.supports_su_root_command().await? {
            Ok(Privilege::SuRoot)
        } else {
            Ok(Privilege::Default)
        }
    }

    /// Rooted, or able to become root through `su`.
    pub async fn has_root_access(&self) -> Result<bool> {
        Ok(self.is_root().await? || self.supports_su_root_command().await?)
    }

    /// `su` works but the shell is not root: the one case where a direct
    /// transfer may be refused and a privileged copy can still succeed.
    pub async fn needs_su_for_root(&self) -> Result<bool> {
        Ok(!self.is_root().await? && self.supports_su_root_command().await?)
    }

    async fn probe_test_command(&self) -> Result<bool> {
        let file = self.create_probe_file(".__temp_test_test__file__.tmp").await?;
        let result = self.runner.execute(&command("test -e ", file.path())).await;
        file.close().await;

        Ok(!result?.is_error)
    }

    async fn probe_rm_force_flag(&self) -> Result<bool> {
        let mut file = self.create_probe_file(".__temp_rm_test_file__.tmp").await?;
        let result = self.runner.execute(&command("rm -f ", file.path())).await;

        let supported = matches!(&result, Ok(r) if !r.is_error);
        if supported {
            file.disarm();
        }
        file.close().await;

        result.map(|_| supported)
    }

    async fn probe_touch_command(&self) -> Result<bool> {
        self.ensure_probe_directory().await?;

        let mut file = ScopedRemoteFile::new(
            self.runner.clone(),
            self.probe_path(".__temp_touch_test_file__.tmp"),
            Privilege::Default,
        );
        let result = self.runner.execute(&command("touch ", file.path())).await;

        let supported = matches!(&result, Ok(r) if !r.is_error);
        if !supported {
            file.disarm();
        }
        file.close().await;

        result.map(|_| supported)
    }

    async fn probe_su_root_command(&self) -> Result<bool> {
        let command = ShellCommandBuilder::with_privilege(&Privilege::SuRoot)
            .text("id")
            .build();
        Ok(!self.runner.execute(&command).await?.is_error)
    }

    async fn probe_is_root(&self) -> Result<bool> {
        Ok(self.runner.device().is_root().await?)
    }

    async fn probe_cp_command(&self) -> Result<bool> {
        let source = self.create_probe_file(".__temp_cp_test_file__.tmp").await?;
        let mut destination = ScopedRemoteFile::new(
            self.runner.clone(),
            self.probe_path(".__temp_cp_test_file_dst__.tmp"),
            Privilege::Default,
        );

        let command = ShellCommandBuilder::new()
            .text("cp ")
            .escaped_path(source.path())
            .text(" ")
            .escaped_path(destination.path())
            .build();
        let result = self.runner.execute(&command).await;

        let supported = matches!(&result, Ok(r) if !r.is_error);
        if !supported {
            destination.disarm();
        }
        source.close().await;
        destination.close().await;

        result.map(|_| supported)
    }

    async fn probe_escaping_ls(&self) -> Result<bool> {
        self.ensure_probe_directory().await?;

        // The space is what an escaping `ls` gives away.
        let name = format!("{} test__.tmp", unique_name(".__temp_escaping_ls_"));
        let directory = &self.runner.config().probe_directory;
        let escaped_name = name.replace(' ', "\\ ");
        let escaped_path = format!("{directory}/{escaped_name}");
        let path = format!("{directory}/{name}");

        let touch = ShellCommandBuilder::new()
            .text("touch ")
            .escaped_path(directory)
            .text("/")
            .text(&escaped_name)
            .build();
        let result = self.runner.execute(&touch).await?;
        self.runner.check(result)?;

        let file = ScopedRemoteFile::new(self.runner.clone(), path.clone(), Privilege::Default);
        let ls = ShellCommandBuilder::new()
            .text("ls ")
            .escaped_path(directory)
            .text("/")
            .text(&escaped_name)
            .build();
        let result = self.runner.execute(&ls).await;
        file.close().await;

        let result = self.runner.throw_if_error(result?)?;
        match result.first_line() {
            Some(line) if line == path => Ok(false),
            Some(line) if line == escaped_path => Ok(true),
            other => Err(Error::UnexpectedOutput(format!(
                "`ls` printed {other:?}, expected {path:?} or {escaped_path:?}"
            ))),
        }
    }

    async fn probe_mktemp_command(&self) -> Result<bool> {
        self.ensure_probe_directory().await?;

        let result = self
            .runner
            .execute(&command(
                "mktemp -p ",
                &self.runner.config().probe_directory,
            ))
            .await?;
        if result.is_error {
            return Ok(false);
        }

        match result.first_line().map(str::trim) {
            Some(path) if !path.is_empty() => {
                ScopedRemoteFile::new(self.runner.clone(), path, Privilege::Default)
                    .close()
                    .await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn probe_logcat_epoch_modifier(&self) -> Result<bool> {
        let command = ShellCommandBuilder::new()
            .text("logcat -d -t 1 -v epoch")
            .build();
        let mut lines = Vec::<String>::new();
        self.runner.execute_raw(&command, &mut lines).await?;

        Ok(lines.iter().any(|line| LOGCAT_EPOCH_LINE.is_match(line)))
    }
}
