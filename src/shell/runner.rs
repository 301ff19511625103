use std::sync::Arc;
use tokio::time;

use super::command::{ShellCommand, COMMAND_ERROR_CHECK_SUFFIX, ERROR_LINE_MARKER};
use crate::{
    config::Config,
    device::{Device, ShellOutputReceiver},
    error::{Error, Result},
};

/// Output of a shell command after sentinel processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    pub output: Vec<String>,
    pub is_error: bool,
}

impl CommandResult {
    /// Splits `output` into lines and, when `check_errors` is set, detects
    /// and strips the trailing sentinel.
    pub fn parse(command: &str, output: &str, check_errors: bool) -> Self {
        let mut lines: Vec<String> = if output.is_empty() {
            vec![]
        } else {
            output
                .split('\n')
                .map(|line| line.trim_end_matches('\r').to_owned())
                .collect()
        };

        let is_error = check_errors
            && lines.len() >= 2
            && lines[lines.len() - 1].is_empty()
            && lines[lines.len() - 2] == ERROR_LINE_MARKER;

        if is_error {
            lines.truncate(lines.len() - 2);
        }

        Self {
            command: command.to_owned(),
            output: lines,
            is_error,
        }
    }

    pub fn first_line(&self) -> Option<&str> {
        self.output.first().map(String::as_str)
    }
}

/// Sends commands to one device and interprets what comes back.
#[derive(Clone)]
pub struct ShellRunner {
    device: Arc<dyn Device>,
    config: Arc<Config>,
}

impl ShellRunner {
    pub fn new(device: Arc<dyn Device>, config: Arc<Config>) -> Self {
        Self { device, config }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs `command` with the error sentinel appended.
    pub async fn execute(&self, command: &ShellCommand) -> Result<CommandResult> {
        self.run(command, true).await
    }

    /// Runs `command` as is. `is_error` is always `false`.
    pub async fn execute_unchecked(&self, command: &ShellCommand) -> Result<CommandResult> {
        self.run(command, false).await
    }

    async fn run(&self, command: &ShellCommand, check_errors: bool) -> Result<CommandResult> {
        let text = if check_errors {
            format!("{command}{COMMAND_ERROR_CHECK_SUFFIX}")
        } else {
            command.to_string()
        };

        debug!("{}: {}", self.device.serial(), text);

        let output = time::timeout(self.config.command_timeout, self.device.execute_shell(&text))
            .await??;

        Ok(CommandResult::parse(command.as_str(), &output, check_errors))
    }

    /// Streams the output of a long running command to `receiver`.
    ///
    /// No sentinel and no timeout: the command ends when the device closes
    /// the stream or the receiver cancels.
    pub async fn execute_raw(
        &self,
        command: &ShellCommand,
        receiver: &mut dyn ShellOutputReceiver,
    ) -> Result<()> {
        debug!("{}: {} (streaming)", self.device.serial(), command);
        Ok(self
            .device
            .execute_streaming(command.as_str(), receiver)
            .await?)
    }

    /// Like [`throw_if_error`](Self::throw_if_error), for callers that have
    /// no use for the output.
    pub fn check(&self, result: CommandResult) -> Result<()> {
        self.throw_if_error(result).map(|_| ())
    }

    /// Turns an error result into [`Error::ShellCommand`].
    pub fn throw_if_error(&self, result: CommandResult) -> Result<CommandResult> {
        if !result.is_error {
            return Ok(result);
        }

        let message = match result.output.as_slice() {
            [line] => line.clone(),
            _ => format!("command failed: {}", result.command),
        };

        let mut output = result.output;
        output.truncate(self.config.max_error_lines);

        Err(Error::ShellCommand {
            command: result.command,
            message,
            output,
        })
    }
}
