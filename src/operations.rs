use std::sync::Arc;

use crate::{
    capabilities::DeviceCapabilities,
    error::{Error, Result},
    listing::join_path,
    shell::{Privilege, ShellCommandBuilder, ShellRunner},
    temp::unique_name,
};

/// Rejects names that would not designate a direct child.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("file name is empty".to_owned()));
    }
    if name.contains('/') {
        return Err(Error::Validation(format!(
            "file name {name:?} contains a path separator"
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::Validation(format!("{name:?} is not a valid file name")));
    }
    Ok(())
}

/// Create, delete and copy operations of one device.
///
/// Every command gets the `run-as` or `su` prefix picked by
/// [`DeviceCapabilities::privilege_for`].
#[derive(Clone)]
pub struct FileOperations {
    runner: ShellRunner,
    capabilities: Arc<DeviceCapabilities>,
}

impl FileOperations {
    pub fn new(runner: ShellRunner, capabilities: Arc<DeviceCapabilities>) -> Self {
        Self {
            runner,
            capabilities,
        }
    }

    /// Creates the empty file `name` in `parent` and returns its path.
    ///
    /// The existence check and the creation are separate commands; a file
    /// appearing in between goes unnoticed.
    pub async fn create_new_file(
        &self,
        parent: &str,
        name: &str,
        run_as: Option<&str>,
    ) -> Result<String> {
        validate_name(name)?;
        let path = join_path(parent, name);
        let privilege = self.capabilities.privilege_for(run_as).await?;

        if self.exists(&path, &privilege).await? {
            return Err(Error::AlreadyExists(path));
        }

        let text = if self.capabilities.supports_touch_command().await? {
            "touch "
        } else {
            "echo -n >"
        };

        self.run_checked(ShellCommandBuilder::with_privilege(&privilege).text(text), &path)
            .await?;
        Ok(path)
    }

    /// Creates the directory `name` in `parent` and returns its path.
    pub async fn create_new_directory(
        &self,
        parent: &str,
        name: &str,
        run_as: Option<&str>,
    ) -> Result<String> {
        validate_name(name)?;
        let path = join_path(parent, name);
        let privilege = self.capabilities.privilege_for(run_as).await?;

        let command = ShellCommandBuilder::with_privilege(&privilege)
            .text("mkdir ")
            .escaped_path(&path)
            .build();
        let result = self.runner.execute(&command).await?;

        if result.is_error && result.output.iter().any(|line| line.contains("File exists")) {
            return Err(Error::AlreadyExists(path));
        }
        self.runner.check(result)?;
        Ok(path)
    }

    pub async fn delete_file(&self, path: &str, run_as: Option<&str>) -> Result<()> {
        let privilege = self.capabilities.privilege_for(run_as).await?;
        let text = if self.capabilities.supports_rm_force_flag().await? {
            "rm -f "
        } else {
            "rm "
        };

        self.run_checked(ShellCommandBuilder::with_privilege(&privilege).text(text), path)
            .await
    }

    /// Deletes `path` and everything below it.
    pub async fn delete_recursive(&self, path: &str, run_as: Option<&str>) -> Result<()> {
        let privilege = self.capabilities.privilege_for(run_as).await?;
        let text = if self.capabilities.supports_rm_force_flag().await? {
            "rm -r -f "
        } else {
            "rm -r "
        };

        self.run_checked(ShellCommandBuilder::with_privilege(&privilege).text(text), path)
            .await
    }

    async fn run_checked(&self, builder: ShellCommandBuilder, path: &str) -> Result<()> {
        let command = builder.escaped_path(path).build();
        self.runner.check(self.runner.execute(&command).await?)?;
        Ok(())
    }

    pub async fn copy_file(
        &self,
        source: &str,
        destination: &str,
        run_as: Option<&str>,
    ) -> Result<()> {
        let privilege = self.capabilities.privilege_for(run_as).await?;
        self.copy_with_privilege(source, destination, &privilege).await
    }

    /// `cp`, or `cat` redirected into the destination on devices without it.
    pub(crate) async fn copy_with_privilege(
        &self,
        source: &str,
        destination: &str,
        privilege: &Privilege,
    ) -> Result<()> {
        let (program, redirect) = if self.capabilities.supports_cp_command().await? {
            ("cp ", " ")
        } else {
            ("cat ", " >")
        };

        let builder = ShellCommandBuilder::with_privilege(privilege)
            .text(program)
            .escaped_path(source)
            .text(redirect);
        self.run_checked(builder, destination).await
    }

    /// Creates an empty file as `privilege`. `false` when the shell
    /// refused, for instance inside another application's data.
    pub async fn touch(&self, path: &str, privilege: &Privilege) -> Result<bool> {
        let command = ShellCommandBuilder::with_privilege(privilege)
            .text("touch ")
            .escaped_path(path)
            .build();
        Ok(!self.runner.execute(&command).await?.is_error)
    }

    /// Best effort: `test -e`, or `ls -d -a` where `test` is missing.
    pub async fn exists(&self, path: &str, privilege: &Privilege) -> Result<bool> {
        let text = if self.capabilities.supports_test_command().await? {
            "test -e "
        } else {
            "ls -d -a "
        };
        let command = ShellCommandBuilder::with_privilege(privilege)
            .text(text)
            .escaped_path(path)
            .build();
        Ok(!self.runner.execute(&command).await?.is_error)
    }

    /// Creates an empty file in the temp directory, owned by the shell
    /// user, and returns its path.
    pub async fn create_temp_file(&self) -> Result<String> {
        let directory = &self.runner.config().temp_directory;

        if self.capabilities.supports_mktemp_command().await? {
            let command = ShellCommandBuilder::new()
                .text("mktemp -p ")
                .escaped_path(directory)
                .build();
            let result = self.runner.throw_if_error(self.runner.execute(&command).await?)?;

            return match result.first_line().map(str::trim) {
                Some(path) if !path.is_empty() => Ok(path.to_owned()),
                _ => Err(Error::UnexpectedOutput(format!(
                    "mktemp printed {:?}",
                    result.output
                ))),
            };
        }

        let path = join_path(directory, &unique_name("temp"));
        if !self.touch(&path, &Privilege::Default).await? {
            let command = ShellCommandBuilder::new()
                .text("echo -n >")
                .escaped_path(&path)
                .build();
            self.runner.check(self.runner.execute(&command).await?)?;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{capabilities::Capability, mock::MockDevice};

    async fn operations(
        device: MockDevice,
        seeds: &[(Capability, bool)],
    ) -> (Arc<MockDevice>, FileOperations) {
        let (device, runner) = device.into_runner();
        let capabilities = Arc::new(DeviceCapabilities::new(runner.clone()));
        capabilities.seed(Capability::SuRootCommand, false).await;
        for (capability, value) in seeds {
            capabilities.seed(*capability, *value).await;
        }
        (device, FileOperations::new(runner, capabilities))
    }

    #[test]
    fn names_with_separators_are_rejected() {
        assert!(matches!(validate_name("a/b"), Err(Error::Validation(_))));
        assert!(matches!(validate_name(""), Err(Error::Validation(_))));
        assert!(matches!(validate_name(".."), Err(Error::Validation(_))));
        assert!(validate_name("a b.txt").is_ok());
    }

    #[tokio::test]
    async fn invalid_name_needs_no_round_trip() {
        let (device, ops) = operations(MockDevice::new(), &[]).await;

        let result = ops.create_new_file("/sdcard", "x/y", None).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(device.executed().is_empty());
    }

    #[tokio::test]
    async fn existing_file_is_not_touched() {
        let (device, ops) = operations(
            MockDevice::new(),
            &[(Capability::TestCommand, true), (Capability::TouchCommand, true)],
        )
        .await;
        device.add_command("test -e '/sdcard/test/a.txt'", "");

        match ops.create_new_file("/sdcard/test", "a.txt", None).await {
            Err(Error::AlreadyExists(path)) => assert_eq!(path, "/sdcard/test/a.txt"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!device.was_executed("touch '/sdcard/test/a.txt'"));
    }

    #[tokio::test]
    async fn new_file_with_touch() {
        let (device, ops) = operations(
            MockDevice::new(),
            &[(Capability::TestCommand, true), (Capability::TouchCommand, true)],
        )
        .await;
        device.add_failed_command("test -e '/sdcard/b.txt'", "");
        device.add_command("touch '/sdcard/b.txt'", "");

        let path = ops.create_new_file("/sdcard", "b.txt", None).await.unwrap();
        assert_eq!(path, "/sdcard/b.txt");
        assert!(device.was_executed("touch '/sdcard/b.txt'"));
    }

    #[tokio::test]
    async fn new_file_on_old_toolbox() {
        let (device, ops) = operations(
            MockDevice::new(),
            &[(Capability::TestCommand, false), (Capability::TouchCommand, false)],
        )
        .await;
        device.add_failed_command(
            "ls -d -a '/sdcard/c.txt'",
            "/sdcard/c.txt: No such file or directory\n",
        );
        device.add_command("echo -n >'/sdcard/c.txt'", "");

        ops.create_new_file("/sdcard", "c.txt", None).await.unwrap();
        assert!(device.was_executed("echo -n >'/sdcard/c.txt'"));
    }

    #[tokio::test]
    async fn read_only_file_system() {
        let (device, ops) = operations(
            MockDevice::new(),
            &[(Capability::TestCommand, true), (Capability::TouchCommand, true)],
        )
        .await;
        device.add_failed_command("test -e '/system/foo.txt'", "");
        device.add_failed_command(
            "touch '/system/foo.txt'",
            "touch: '/system/foo.txt': Read-only file system\n",
        );

        match ops.create_new_file("/system", "foo.txt", None).await {
            Err(Error::ShellCommand { message, .. }) => {
                assert_eq!(message, "touch: '/system/foo.txt': Read-only file system");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn existing_directory() {
        let (device, ops) = operations(MockDevice::new(), &[]).await;
        device.add_failed_command("mkdir '/data'", "mkdir: '/data': File exists\n");
        device.add_failed_command("mkdir '/sys/x'", "mkdir: '/sys/x': Permission denied\n");

        assert!(matches!(
            ops.create_new_directory("/", "data", None).await,
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            ops.create_new_directory("/sys", "x", None).await,
            Err(Error::ShellCommand { .. })
        ));
    }

    #[tokio::test]
    async fn recursive_delete() {
        let (device, ops) = operations(MockDevice::new(), &[(Capability::RmForceFlag, true)]).await;
        device.add_command("rm -r -f '/sdcard/test/dir'", "");

        ops.delete_recursive("/sdcard/test/dir", None).await.unwrap();
        assert_eq!(
            device.executed(),
            vec!["rm -r -f '/sdcard/test/dir' || echo ERR-ERR-ERR-ERR"]
        );
    }

    #[tokio::test]
    async fn delete_without_force_flag() {
        let (device, ops) =
            operations(MockDevice::new(), &[(Capability::RmForceFlag, false)]).await;
        device.add_failed_command("rm '/config'", "rm: /config: Permission denied\n");

        assert!(matches!(
            ops.delete_file("/config", None).await,
            Err(Error::ShellCommand { .. })
        ));
    }

    #[tokio::test]
    async fn delete_as_package() {
        let (device, ops) = operations(MockDevice::new(), &[(Capability::RmForceFlag, true)]).await;
        device.add_command(
            "run-as com.example.app sh -c 'rm -f '\\''/data/data/com.example.app/a'\\'''",
            "",
        );

        ops.delete_file("/data/data/com.example.app/a", Some("com.example.app"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn copy_falls_back_to_cat() {
        let (device, ops) = operations(MockDevice::new(), &[(Capability::CpCommand, false)]).await;
        device.add_command("cat '/sdcard/a' >'/sdcard/b'", "");

        ops.copy_file("/sdcard/a", "/sdcard/b", None).await.unwrap();
    }

    #[tokio::test]
    async fn temp_file_from_mktemp() {
        let (device, ops) =
            operations(MockDevice::new(), &[(Capability::MkTempCommand, true)]).await;
        device.add_command("mktemp -p '/data/local/tmp'", "/data/local/tmp/tmp.a1B2c3\n");

        assert_eq!(ops.create_temp_file().await.unwrap(), "/data/local/tmp/tmp.a1B2c3");
    }

    #[tokio::test]
    async fn temp_file_without_mktemp() {
        let (device, ops) =
            operations(MockDevice::new(), &[(Capability::MkTempCommand, false)]).await;

        // Nothing scripted: the generated name is unknown, so `touch` is
        // rejected by the mock and surfaces as a transport error.
        let result = ops.create_temp_file().await;
        assert!(matches!(result, Err(Error::Transport(_))));
        let executed = device.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].starts_with("touch '/data/local/tmp/temp"));
    }
}
