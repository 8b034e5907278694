//! Shell command lines for the worker.
//!
//! Commands are assembled from a trusted program prefix (taken from configuration)
//! followed by arguments that are quoted individually. Values that only contain
//! characters with no meaning to the shell are emitted bare so logs stay readable.

use std::fmt;
use std::path::Path;

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | ',' | '@' | '%' | '+')
}

/// Quotes `value` for a POSIX shell.
pub fn quote(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_shell_safe) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    parts: Vec<String>,
}

impl ShellCommand {
    /// Starts a command from a trusted prefix such as `"poetry run python"`.
    pub fn new(program: &str) -> Self {
        Self {
            parts: vec![program.trim().to_string()],
        }
    }

    /// Appends one quoted argument.
    pub fn arg(mut self, value: impl AsRef<str>) -> Self {
        self.parts.push(quote(value.as_ref()));
        self
    }

    pub fn path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Appends `name value` as two words.
    pub fn option(self, name: &str, value: impl AsRef<str>) -> Self {
        self.arg(name).arg(value)
    }

    /// Appends `name=value` as one word, the form used by both `--flag=value`
    /// options and Hydra-style `key=value` overrides.
    pub fn assign(self, name: &str, value: impl AsRef<str>) -> Self {
        let word = format!("{}={}", name, value.as_ref());
        self.arg(word)
    }

    pub fn assign_path(self, name: &str, path: &Path) -> Self {
        self.assign(name, path.to_string_lossy())
    }

    /// Appends a literal fragment without quoting. Only for fixed, trusted text
    /// such as redirections or glob patterns.
    pub(crate) fn raw(mut self, fragment: &str) -> Self {
        self.parts.push(fragment.to_string());
        self
    }

    pub fn render(&self) -> String {
        self.parts.join(" ")
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
