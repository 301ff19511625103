use std::fmt;

/// Marker echoed when a command chain fails.
pub const ERROR_LINE_MARKER: &str = "ERR-ERR-ERR-ERR";
/// Appended to checked commands; the transport drops exit codes.
pub const COMMAND_ERROR_CHECK_SUFFIX: &str = " || echo ERR-ERR-ERR-ERR";

/// User the command runs as on the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Privilege {
    /// The `adb shell` user
    #[default]
    Default,
    /// `su 0 sh -c '...'`
    SuRoot,
    /// `run-as <package> sh -c '...'`
    RunAs(String),
}

impl Privilege {
    pub fn run_as<T: Into<String>>(package: T) -> Self {
        Self::RunAs(package.into())
    }

    fn wrapper(&self) -> Option<String> {
        match self {
            Self::Default => None,
            Self::SuRoot => Some("su 0 sh -c '".to_owned()),
            Self::RunAs(package) => Some(format!("run-as {package} sh -c '")),
        }
    }
}

/// Finalized shell command text, ready to be sent to the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShellCommand(String);

impl ShellCommand {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wraps `path` in single quotes so the shell passes it through verbatim.
/// Embedded single quotes become `'\''`; backslashes need nothing inside
/// single quotes.
pub fn escape_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len() + 2);
    escaped.push('\'');
    for c in path.chars() {
        if c == '\'' {
            escaped.push_str("'\\''");
        } else {
            escaped.push(c);
        }
    }
    escaped.push('\'');
    escaped
}

/// Incrementally assembles a [`ShellCommand`].
///
/// The privilege wrapper is chosen up front, so it is always the first
/// element and there is never more than one. Every fragment added inside a
/// wrapper is escaped for the enclosing single-quoted `sh -c` argument;
/// [`build`](Self::build) appends the closing quote.
#[derive(Debug, Default)]
pub struct ShellCommandBuilder {
    text: String,
    wrapped: bool,
}

impl ShellCommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_privilege(privilege: &Privilege) -> Self {
        match privilege.wrapper() {
            Some(text) => Self {
                text,
                wrapped: true,
            },
            None => Self::new(),
        }
    }

    /// Adds `text` as is (apart from the quoting needed by a wrapper).
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        if self.wrapped {
            self.text.push_str(&text.replace('\'', "'\\''"));
        } else {
            self.text.push_str(text);
        }
        self
    }

    /// Adds `path` as a single shell word.
    #[must_use]
    pub fn escaped_path(self, path: &str) -> Self {
        let escaped = escape_path(path);
        self.text(&escaped)
    }

    pub fn build(mut self) -> ShellCommand {
        if self.wrapped {
            self.text.push('\'');
        }
        ShellCommand(self.text)
    }

    /// Closes the wrapper, then redirects the output of the whole command
    /// into `path` as the calling shell user.
    pub fn build_redirected(self, path: &str) -> ShellCommand {
        let mut text = self.build().into_string();
        text.push_str(" >");
        text.push_str(&escape_path(path));
        ShellCommand(text)
    }
}
