//! Action dispatch.
//!
//! Every labelled [`Action`] maps to one [`Handler`]. An unknown label is
//! offered to the native-binary launcher first; if the launcher declines it,
//! the run ends with status 0 and a usage hint on stderr. That status is a
//! compatibility contract with existing start scripts, not an oversight.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::rc::Rc;

use crate::action::{Action, Invocation};
use crate::fault::{ExitOutcome, ToolError};
use crate::launcher::NativeLauncher;

/// Uniform "run and return status" capability.
pub trait Handler {
    /// Run with the handler's own arguments (the invocation's `args[1..]`).
    ///
    /// # Errors
    ///
    /// Returns a classified [`ToolError`]; the fault boundary turns it into
    /// status 1.
    fn run(&self, args: &[OsString]) -> Result<ExitOutcome, ToolError>;
}

/// Handler table plus the launcher consulted for unknown labels.
pub struct Dispatcher {
    handlers: BTreeMap<Action, Box<dyn Handler>>,
    launcher: Rc<dyn NativeLauncher>,
}

impl Dispatcher {
    /// Dispatcher with no handlers.
    #[must_use]
    pub fn new(launcher: Rc<dyn NativeLauncher>) -> Self {
        Self {
            handlers: BTreeMap::new(),
            launcher,
        }
    }

    /// Register the handler for a labelled action, replacing any previous
    /// one.
    #[must_use]
    pub fn with_handler(mut self, action: Action, handler: Box<dyn Handler>) -> Self {
        debug_assert!(action.label().is_some(), "only labelled actions have handlers");
        self.handlers.insert(action, handler);
        self
    }

    /// Final action for `invocation`, consulting the launcher for unknown
    /// labels.
    #[must_use]
    pub fn route(&self, invocation: &Invocation) -> Action {
        match invocation.action {
            Action::Unknown if self.launcher.is_candidate(invocation.program()) => {
                Action::LauncherFallback
            },
            action => action,
        }
    }

    /// Run exactly one handler for `invocation`.
    ///
    /// # Errors
    ///
    /// Propagates the classified error of the selected handler.
    pub fn dispatch(&self, invocation: &Invocation) -> Result<ExitOutcome, ToolError> {
        let action = self.route(invocation);
        tracing::debug!(%action, label = %invocation.label, "dispatching");

        match action {
            Action::LauncherFallback => Ok(self.launcher.run(&invocation.args)?),
            Action::Unknown => Ok(ExitOutcome::success().with_diagnostic(usage(&invocation.label))),
            labelled => match self.handlers.get(&labelled) {
                Some(handler) => handler.run(invocation.handler_args()),
                None => {
                    tracing::warn!(%action, "no handler registered");
                    Ok(ExitOutcome::success().with_diagnostic(usage(&invocation.label)))
                },
            },
        }
    }
}

/// Usage hint for an unrecognised label.
#[must_use]
pub fn usage(label: &str) -> String {
    let (delegated, own): (Vec<Action>, Vec<Action>) =
        Action::LABELLED.into_iter().partition(|a| a.is_delegated());
    let names = |actions: Vec<Action>| {
        actions
            .into_iter()
            .filter_map(Action::label)
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "unknown action '{label}'\nactions: {}\n(also: {})",
        names(own),
        names(delegated)
    )
}
