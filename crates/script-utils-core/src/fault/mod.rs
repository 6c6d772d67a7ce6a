//! Outcome classification.
//!
//! Every handler returns `Result<ExitOutcome, ToolError>`. [`FaultBoundary`]
//! wraps the whole dispatch once and turns a classified [`ToolError`] into a
//! single diagnostic line with exit status 1. Panics are runtime faults: the
//! boundary never intercepts them, so they unwind with their original
//! message and the process dies as it would without the boundary.

use std::io::{self, Write};

use thiserror::Error;

use crate::env::EnvExportError;
use crate::home::HomeError;
use crate::identity::IdentityError;
use crate::launcher::LaunchError;
use crate::permissions::PermissionError;
use crate::subsystem::SubsystemError;

/// Exit codes produced by the toolkit itself.
///
/// Anything else comes from a subsystem or a launched binary and is passed
/// through unchanged.
pub mod exit_codes {
    /// Success, including the unknown-action fallback.
    pub const SUCCESS: i32 = 0;
    /// Classified application error or failed IPv6-only probe.
    pub const ERROR: i32 = 1;
    /// Base for children terminated by a signal (`128 + signo`).
    pub const SIGNAL_BASE: i32 = 128;
}

/// Classified application errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    /// Filesystem reconciliation failed.
    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// The service user could not be resolved.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The install root could not be determined.
    #[error(transparent)]
    Home(#[from] HomeError),

    /// Environment export failed.
    #[error(transparent)]
    EnvExport(#[from] EnvExportError),

    /// The native-binary launcher failed before the binary ran.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// A delegated subsystem could not be started.
    #[error(transparent)]
    Subsystem(#[from] SubsystemError),

    /// A handler rejected its arguments.
    #[error("{action}: {message}")]
    InvalidArguments {
        /// Action label.
        action: &'static str,
        /// Parser message (first line).
        message: String,
    },

    /// Writing handler output failed.
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

/// Terminal state of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    code: i32,
    diagnostic: Option<String>,
}

impl ExitOutcome {
    /// Implicit success: status 0, nothing to report.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            code: exit_codes::SUCCESS,
            diagnostic: None,
        }
    }

    /// Explicit status with no diagnostic.
    #[must_use]
    pub const fn status(code: i32) -> Self {
        Self {
            code,
            diagnostic: None,
        }
    }

    /// Status 1 with a single-line diagnostic.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            code: exit_codes::ERROR,
            diagnostic: Some(single_line(&message.into())),
        }
    }

    /// Attach diagnostic text (may span several lines).
    #[must_use]
    pub fn with_diagnostic(mut self, text: impl Into<String>) -> Self {
        self.diagnostic = Some(text.into());
        self
    }

    /// Process exit status.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// Diagnostic text destined for stderr.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    /// Whether the status is 0.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == exit_codes::SUCCESS
    }

    /// Write the diagnostic, newline-terminated, to `out`.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying writer.
    pub fn emit(&self, out: &mut impl Write) -> io::Result<()> {
        if let Some(text) = &self.diagnostic {
            writeln!(out, "{text}")?;
            out.flush()?;
        }
        Ok(())
    }
}

/// The single top-level classification point.
///
/// Consumed by [`FaultBoundary::run`], so one boundary classifies at most one
/// run.
#[derive(Debug, Default)]
pub struct FaultBoundary {
    _private: (),
}

impl FaultBoundary {
    /// Create a boundary in the running state.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Run `body` and classify its result.
    ///
    /// A [`ToolError`] becomes status 1 with its message as the only
    /// diagnostic line. A panic inside `body` is not caught.
    pub fn run<F>(self, body: F) -> ExitOutcome
    where
        F: FnOnce() -> Result<ExitOutcome, ToolError>,
    {
        match body() {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::debug!(error = ?err, "classified application error");
                ExitOutcome::failure(err.to_string())
            },
        }
    }
}

/// Collapse a message onto one line.
fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
