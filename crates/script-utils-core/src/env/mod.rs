//! Environment export as POSIX shell.
//!
//! `export-env` renders `<home>/conf/vespa/default-env.txt` so that start
//! scripts can `eval` it. `security-env` renders the TLS settings (see
//! [`security`]). Both produce a [`ShellEnv`] and print it to stdout.
//!
//! # default-env.txt
//!
//! ```text
//! # comment
//! fallback VESPA_PORT_BASE 19000
//! override VESPA_USER vespa
//! unset VESPA_LOG_TARGET
//! ```
//!
//! `fallback` only applies when the variable is not already set in the
//! environment, `override` always applies, `unset` removes it.

pub mod security;

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::dispatch::Handler;
use crate::fault::{ExitOutcome, ToolError};
use crate::home::HOME_ENV_VAR;

pub use security::SecurityEnvHandler;

/// Location of the defaults file below the install root.
pub const DEFAULT_ENV_FILE: &str = "conf/vespa/default-env.txt";

/// Errors producing shell environment text.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnvExportError {
    /// The defaults file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A directive has no variable name.
    #[error("{}:{line}: '{directive}' needs a variable name", path.display())]
    MissingName {
        /// File path.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// The directive keyword.
        directive: String,
    },

    /// The TLS config file could not be read.
    #[error("cannot read TLS config {}: {source}", path.display())]
    TlsConfigRead {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The TLS config file is not valid JSON of the expected shape.
    #[error("invalid TLS config {}: {source}", path.display())]
    TlsConfigParse {
        /// File path.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
}

/// One variable change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChange {
    /// Set and export.
    Export(String),
    /// Remove from the environment.
    Unset,
}

/// Ordered set of variable changes, first-mention order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellEnv {
    entries: Vec<(String, EnvChange)>,
}

impl ShellEnv {
    /// Empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `name=value`, replacing any earlier change to `name`.
    pub fn export(&mut self, name: &str, value: impl Into<String>) {
        self.set(name, EnvChange::Export(value.into()));
    }

    /// Unset `name`, replacing any earlier change to `name`.
    pub fn unset(&mut self, name: &str) {
        self.set(name, EnvChange::Unset);
    }

    /// Export `name=value` unless `name` is already set in `current` or
    /// already changed here.
    pub fn fallback(&mut self, name: &str, value: impl Into<String>, current: Option<&str>) {
        if current.is_some_and(|v| !v.is_empty()) || self.get(name).is_some() {
            return;
        }
        self.export(name, value);
    }

    /// Pending change for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EnvChange> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, change)| change)
    }

    /// Whether nothing would be printed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as shell text suitable for `eval`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, change) in &self.entries {
            match change {
                EnvChange::Export(value) => {
                    out.push_str(&format!("{name}={}\nexport {name}\n", shell_quote(value)));
                },
                EnvChange::Unset => out.push_str(&format!("unset {name}\n")),
            }
        }
        out
    }

    fn set(&mut self, name: &str, change: EnvChange) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = change,
            None => self.entries.push((name.to_string(), change)),
        }
    }
}

/// Single-quote `value` for a POSIX shell.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Build the default environment for `home`.
///
/// `VESPA_HOME` is always exported as a fallback. A missing defaults file is
/// treated as empty.
///
/// # Errors
///
/// Returns an [`EnvExportError`] when the file cannot be read or a directive
/// lacks its variable name.
pub fn default_env<F>(home: &Path, lookup: F) -> Result<ShellEnv, EnvExportError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut env = ShellEnv::new();
    env.fallback(
        HOME_ENV_VAR,
        home.display().to_string(),
        lookup(HOME_ENV_VAR).as_deref(),
    );

    let path = home.join(DEFAULT_ENV_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no defaults file");
            return Ok(env);
        },
        Err(source) => return Err(EnvExportError::Read { path, source }),
    };

    for (index, line) in content.lines().enumerate() {
        let mut fields = line.split_whitespace();
        let Some(directive) = fields.next() else {
            continue;
        };
        if directive.starts_with('#') {
            continue;
        }
        let Some(name) = fields.next() else {
            return Err(EnvExportError::MissingName {
                path,
                line: index + 1,
                directive: directive.to_string(),
            });
        };
        let value = fields.collect::<Vec<_>>().join(" ");

        match directive {
            "fallback" => env.fallback(name, value, lookup(name).as_deref()),
            "override" => env.export(name, value),
            "unset" => env.unset(name),
            other => {
                tracing::warn!(
                    path = %path.display(),
                    line = index + 1,
                    directive = other,
                    "unknown directive"
                );
            },
        }
    }
    Ok(env)
}

/// Write rendered shell text to `out`.
pub(crate) fn write_shell(env: &ShellEnv, out: &mut impl Write) -> Result<(), ToolError> {
    out.write_all(env.render().as_bytes())
        .and_then(|()| out.flush())
        .map_err(ToolError::Output)
}

/// `export-env` handler.
#[derive(Debug, Clone)]
pub struct ExportEnvHandler {
    home: PathBuf,
}

impl ExportEnvHandler {
    /// Handler exporting the defaults of `home`.
    #[must_use]
    pub const fn new(home: PathBuf) -> Self {
        Self { home }
    }
}

impl Handler for ExportEnvHandler {
    fn run(&self, _args: &[OsString]) -> Result<ExitOutcome, ToolError> {
        let env = default_env(&self.home, |name| std::env::var(name).ok())?;
        write_shell(&env, &mut io::stdout().lock())?;
        Ok(ExitOutcome::success())
    }
}
