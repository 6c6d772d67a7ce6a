//! Delegated subsystems.
//!
//! `vespa-deploy`, `vespa-logfmt` and the cluster-state tools are separate
//! programs. The multiplexer only forwards to them: it runs the tool with the
//! handler arguments and passes its exit status through unchanged. Failures
//! inside the tool are the tool's business.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::action::Action;
use crate::dispatch::Handler;
use crate::fault::{ExitOutcome, ToolError};
use crate::home::HOME_ENV_VAR;
use crate::launcher::status_code;

/// Errors starting a subsystem.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubsystemError {
    /// The tool program does not exist.
    #[error("{tool} is not installed (expected {})", path.display())]
    NotInstalled {
        /// Tool name.
        tool: String,
        /// Expected program path.
        path: PathBuf,
    },

    /// The tool program is this executable; forwarding would loop.
    #[error("{tool} resolves to this executable ({}), refusing to re-enter", path.display())]
    Reentrant {
        /// Tool name.
        tool: String,
        /// Program path.
        path: PathBuf,
    },

    /// Spawning or waiting for the tool failed.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        /// Tool name.
        tool: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// A delegated command object.
pub trait Subsystem {
    /// Tool name, e.g. `vespa-deploy`.
    fn name(&self) -> &str;

    /// Run with the tool's own arguments and report its status.
    ///
    /// # Errors
    ///
    /// Returns a [`SubsystemError`] only when the tool could not be run at
    /// all.
    fn execute(&self, args: &[OsString]) -> Result<ExitOutcome, SubsystemError>;
}

/// [`Subsystem`] backed by a program in the subsystem directory.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    tool: String,
    dir: PathBuf,
    home: PathBuf,
}

impl ExternalTool {
    /// Tool `tool` found in `dir`, run with `VESPA_HOME=home`.
    #[must_use]
    pub fn new(tool: impl Into<String>, dir: &Path, home: &Path) -> Self {
        Self {
            tool: tool.into(),
            dir: dir.to_path_buf(),
            home: home.to_path_buf(),
        }
    }

    /// Tool for a delegated action, named by the action's label.
    #[must_use]
    pub fn for_action(action: Action, dir: &Path, home: &Path) -> Option<Self> {
        if !action.is_delegated() {
            return None;
        }
        action.label().map(|label| Self::new(label, dir, home))
    }

    /// Program path.
    #[must_use]
    pub fn program(&self) -> PathBuf {
        self.dir.join(&self.tool)
    }
}

impl Subsystem for ExternalTool {
    fn name(&self) -> &str {
        &self.tool
    }

    fn execute(&self, args: &[OsString]) -> Result<ExitOutcome, SubsystemError> {
        let program = self.program();
        let Ok(resolved) = program.canonicalize() else {
            return Err(SubsystemError::NotInstalled {
                tool: self.tool.clone(),
                path: program,
            });
        };
        let this_exe = std::env::current_exe().and_then(|exe| exe.canonicalize());
        if this_exe.is_ok_and(|exe| exe == resolved) {
            return Err(SubsystemError::Reentrant {
                tool: self.tool.clone(),
                path: program,
            });
        }

        tracing::debug!(tool = %self.tool, program = %program.display(), "forwarding to subsystem");
        let status = Command::new(&program)
            .args(args)
            .env(HOME_ENV_VAR, &self.home)
            .status()
            .map_err(|source| SubsystemError::Spawn {
                tool: self.tool.clone(),
                source,
            })?;
        Ok(ExitOutcome::status(status_code(status)))
    }
}

/// Handler for a delegated action.
pub struct SubsystemHandler {
    subsystem: Box<dyn Subsystem>,
}

impl SubsystemHandler {
    /// Handler running `subsystem`.
    #[must_use]
    pub fn new(subsystem: Box<dyn Subsystem>) -> Self {
        Self { subsystem }
    }
}

impl Handler for SubsystemHandler {
    fn run(&self, args: &[OsString]) -> Result<ExitOutcome, ToolError> {
        tracing::debug!(tool = self.subsystem.name(), "running subsystem");
        Ok(self.subsystem.execute(args)?)
    }
}
