//! Scripted device for tests: a table of exact command texts and the
//! output each one prints, plus an in-memory sync channel.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use crate::{
    config::Config,
    device::{Device, SyncProgress},
    error::{SyncError, SyncErrorCategory, TransportError},
    fs::DeviceFileSystem,
    shell::{ShellRunner, COMMAND_ERROR_CHECK_SUFFIX, ERROR_LINE_MARKER},
};

const CHUNK_SIZE: usize = 1024;

/// Answers commands not in the exact table; gets the command text without
/// the error check suffix and returns the output of a successful run.
type Responder = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
pub(crate) struct MockDevice {
    root: bool,
    commands: Mutex<HashMap<String, String>>,
    responders: Mutex<Vec<Responder>>,
    executed: Mutex<Vec<String>>,
    remote_files: Mutex<HashMap<String, Vec<u8>>>,
    push_errors: Mutex<HashMap<String, SyncError>>,
    pull_errors: Mutex<HashMap<String, SyncError>>,
    pushed: Mutex<Vec<String>>,
    pulled: Mutex<Vec<String>>,
}

impl MockDevice {
    pub fn new() -> Self {
        init_logging();
        Self::default()
    }

    pub fn rooted(mut self) -> Self {
        self.root = true;
        self
    }

    pub fn into_runner(self) -> (Arc<Self>, ShellRunner) {
        let device = Arc::new(self);
        let runner = ShellRunner::new(device.clone(), Arc::new(Config::default()));
        (device, runner)
    }

    pub fn into_file_system(self) -> (Arc<Self>, DeviceFileSystem) {
        let device = Arc::new(self);
        let fs = DeviceFileSystem::new(device.clone(), Config::default());
        (device, fs)
    }

    /// Scripts a checked command that succeeds.
    pub fn add_command(&self, command: &str, output: &str) {
        self.add_raw(&format!("{command}{COMMAND_ERROR_CHECK_SUFFIX}"), output);
    }

    /// Scripts a checked command that fails after printing `output`.
    pub fn add_failed_command(&self, command: &str, output: &str) {
        self.add_command(command, &format!("{output}{ERROR_LINE_MARKER}\n"));
    }

    /// Scripts the exact text sent to the device.
    pub fn add_raw(&self, command: &str, output: &str) {
        let _ = self
            .commands
            .lock()
            .unwrap()
            .insert(command.to_owned(), output.to_owned());
    }

    /// Scripts commands whose text is only known at run time, such as
    /// generated file names.
    pub fn respond<F>(&self, responder: F)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.responders.lock().unwrap().push(Box::new(responder));
    }

    fn answer(&self, command: &str) -> Option<String> {
        if let Some(output) = self.commands.lock().unwrap().get(command) {
            return Some(output.clone());
        }
        let text = command
            .strip_suffix(COMMAND_ERROR_CHECK_SUFFIX)
            .unwrap_or(command);
        self.responders
            .lock()
            .unwrap()
            .iter()
            .find_map(|responder| responder(text))
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// How many times the checked form of `command` was sent.
    pub fn count(&self, command: &str) -> usize {
        let checked = format!("{command}{COMMAND_ERROR_CHECK_SUFFIX}");
        self.executed()
            .iter()
            .filter(|c| **c == checked || *c == command)
            .count()
    }

    pub fn was_executed(&self, command: &str) -> bool {
        self.count(command) > 0
    }

    pub fn set_remote_file(&self, remote: &str, content: &[u8]) {
        let _ = self
            .remote_files
            .lock()
            .unwrap()
            .insert(remote.to_owned(), content.to_vec());
    }

    pub fn remote_file(&self, remote: &str) -> Option<Vec<u8>> {
        self.remote_files.lock().unwrap().get(remote).cloned()
    }

    pub fn fail_push(&self, remote: &str, error: SyncError) {
        let _ = self
            .push_errors
            .lock()
            .unwrap()
            .insert(remote.to_owned(), error);
    }

    pub fn fail_pull(&self, remote: &str, error: SyncError) {
        let _ = self
            .pull_errors
            .lock()
            .unwrap()
            .insert(remote.to_owned(), error);
    }

    pub fn pushed(&self) -> Vec<String> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.pulled.lock().unwrap().clone()
    }
}

fn transfer(content: &[u8], progress: &mut dyn SyncProgress) -> Result<(), SyncError> {
    // The real sync channel reports a zero total for pulls.
    progress.start(0);
    for chunk in content.chunks(CHUNK_SIZE) {
        if progress.is_cancelled() {
            return Err(SyncError::cancelled());
        }
        progress.advance(chunk.len() as u64);
    }
    progress.stop();
    Ok(())
}

#[async_trait]
impl Device for MockDevice {
    fn serial(&self) -> &str {
        "emulator-5554"
    }

    async fn execute_shell(&self, command: &str) -> Result<String, TransportError> {
        self.executed.lock().unwrap().push(command.to_owned());
        // Let concurrent callers interleave as they would over a socket.
        tokio::task::yield_now().await;
        self.answer(command)
            .ok_or_else(|| TransportError::Rejected(format!("unexpected command: {command}")))
    }

    async fn is_root(&self) -> Result<bool, TransportError> {
        Ok(self.root)
    }

    async fn push_file(
        &self,
        local: &Path,
        remote: &str,
        progress: &mut dyn SyncProgress,
    ) -> Result<(), SyncError> {
        self.pushed.lock().unwrap().push(remote.to_owned());
        if let Some(error) = self.push_errors.lock().unwrap().get(remote) {
            return Err(error.clone());
        }

        let content = std::fs::read(local)
            .map_err(|e| SyncError::new(SyncErrorCategory::Other, e.to_string()))?;
        transfer(&content, progress)?;
        self.set_remote_file(remote, &content);
        Ok(())
    }

    async fn pull_file(
        &self,
        remote: &str,
        local: &Path,
        progress: &mut dyn SyncProgress,
    ) -> Result<(), SyncError> {
        self.pulled.lock().unwrap().push(remote.to_owned());
        if let Some(error) = self.pull_errors.lock().unwrap().get(remote) {
            return Err(error.clone());
        }

        let content = self.remote_file(remote).ok_or_else(|| {
            SyncError::new(SyncErrorCategory::Other, "remote object doesn't exist")
        })?;
        transfer(&content, progress)?;
        std::fs::write(local, &content)
            .map_err(|e| SyncError::new(SyncErrorCategory::Other, e.to_string()))
    }
}
