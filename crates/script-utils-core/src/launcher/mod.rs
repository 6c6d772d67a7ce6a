//! Native-binary launcher.
//!
//! A wrapped tool `foo` ships its real executable as `foo-bin`. Invoking the
//! multiplexer as `foo` (or as `start-c-binary foo ...`) runs `foo-bin` with
//! the remaining arguments and passes its exit status through.
//!
//! Recognition: when the program name contains `/` the binary lives next to
//! it, otherwise it lives in `<home>/bin`.

use std::ffi::{OsStr, OsString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::rc::Rc;

use thiserror::Error;

use crate::dispatch::Handler;
use crate::fault::{ExitOutcome, ToolError, exit_codes};
use crate::home::HOME_ENV_VAR;

/// Suffix of wrapped executables.
pub const BINARY_SUFFIX: &str = "-bin";

/// Errors launching a wrapped binary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LaunchError {
    /// `start-c-binary` was given no program.
    #[error("start-c-binary: missing program name")]
    MissingProgram,

    /// No wrapped binary exists for the program.
    #[error(
        "no native binary for '{}' (looked for {})",
        program.to_string_lossy(),
        binary.display()
    )]
    NotFound {
        /// Program name as invoked.
        program: OsString,
        /// Expected binary path.
        binary: PathBuf,
    },

    /// Spawning or waiting for the binary failed.
    #[error("failed to run {}: {source}", binary.display())]
    Spawn {
        /// Binary path.
        binary: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Starts wrapped native binaries.
pub trait NativeLauncher {
    /// Whether `program` names a wrapped native binary.
    fn is_candidate(&self, program: &OsStr) -> bool;

    /// Run the binary wrapped by `args[0]` with `args[1..]`.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] when the binary cannot be found or started.
    fn run(&self, args: &[OsString]) -> Result<ExitOutcome, LaunchError>;
}

/// [`NativeLauncher`] running `<program>-bin` as a child process.
#[derive(Debug, Clone)]
pub struct BinaryLauncher {
    home: PathBuf,
}

impl BinaryLauncher {
    /// Launcher resolving bare program names below `home`.
    #[must_use]
    pub const fn new(home: PathBuf) -> Self {
        Self { home }
    }

    /// Path of the binary wrapped by `program`.
    #[must_use]
    pub fn binary_path(&self, program: &OsStr) -> PathBuf {
        let mut binary = program.to_os_string();
        binary.push(BINARY_SUFFIX);
        if program.as_bytes().contains(&b'/') {
            PathBuf::from(binary)
        } else {
            self.home.join("bin").join(binary)
        }
    }
}

impl NativeLauncher for BinaryLauncher {
    fn is_candidate(&self, program: &OsStr) -> bool {
        !program.is_empty() && is_regular_file(&self.binary_path(program))
    }

    fn run(&self, args: &[OsString]) -> Result<ExitOutcome, LaunchError> {
        let (program, rest) = args.split_first().ok_or(LaunchError::MissingProgram)?;
        let binary = self.binary_path(program);
        if !is_regular_file(&binary) {
            return Err(LaunchError::NotFound {
                program: program.clone(),
                binary,
            });
        }

        tracing::debug!(binary = %binary.display(), args = ?rest, "launching native binary");
        let status = Command::new(&binary)
            .args(rest)
            .env(HOME_ENV_VAR, &self.home)
            .status()
            .map_err(|source| LaunchError::Spawn {
                binary: binary.clone(),
                source,
            })?;

        Ok(ExitOutcome::status(status_code(status)))
    }
}

/// Exit code of a finished child; `128 + signo` when killed by a signal.
#[must_use]
pub fn status_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => exit_codes::SIGNAL_BASE + signal,
        (None, None) => exit_codes::ERROR,
    }
}

fn is_regular_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file())
}

/// `start-c-binary` handler: `args[0]` names the program to wrap.
pub struct StartBinaryHandler {
    launcher: Rc<dyn NativeLauncher>,
}

impl StartBinaryHandler {
    /// Handler delegating to `launcher`.
    #[must_use]
    pub fn new(launcher: Rc<dyn NativeLauncher>) -> Self {
        Self { launcher }
    }
}

impl Handler for StartBinaryHandler {
    fn run(&self, args: &[OsString]) -> Result<ExitOutcome, ToolError> {
        Ok(self.launcher.run(args)?)
    }
}
