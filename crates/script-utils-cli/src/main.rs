//! script-utils - Vespa start-script helper multiplexer
//!
//! One binary, many tools. Invoked as `script-utils <action> ...` or through
//! a link named after the action (or after a wrapped native binary).

use std::io::{self, IsTerminal};
use std::rc::Rc;

use anyhow::{Context, Result};
use script_utils_core::config::{DEFAULT_LOG_FILTER, LOG_ENV_VAR};
use script_utils_core::env::{ExportEnvHandler, SecurityEnvHandler};
use script_utils_core::launcher::{BinaryLauncher, NativeLauncher, StartBinaryHandler};
use script_utils_core::network::{HostnameProbe, Ipv6CheckHandler};
use script_utils_core::subsystem::{ExternalTool, SubsystemHandler};
use script_utils_core::{Action, Dispatcher, FaultBoundary, Invocation, ToolkitConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

use commands::fix_dirs::FixDirsHandler;

fn main() {
    if let Err(err) = init_logging() {
        eprintln!("script-utils: {err:#}");
    }

    let config = ToolkitConfig::from_env();
    let invocation = Invocation::resolve(std::env::args_os().collect());
    tracing::debug!(
        label = %invocation.label,
        home = %config.home.display(),
        "resolved invocation"
    );

    let outcome = FaultBoundary::new().run(|| build_dispatcher(&config).dispatch(&invocation));

    if let Err(err) = outcome.emit(&mut io::stderr().lock()) {
        tracing::warn!(error = %err, "failed to write diagnostic");
    }
    std::process::exit(outcome.code());
}

/// Install the stderr log subscriber.
fn init_logging() -> Result<()> {
    let filter = std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(io::stderr().is_terminal())
                .with_writer(io::stderr),
        )
        .try_init()
        .context("failed to install log subscriber")
}

/// Handler table for one run.
fn build_dispatcher(config: &ToolkitConfig) -> Dispatcher {
    let launcher: Rc<dyn NativeLauncher> = Rc::new(BinaryLauncher::new(config.home.clone()));

    let mut dispatcher = Dispatcher::new(Rc::clone(&launcher))
        .with_handler(
            Action::NativeBinaryLaunch,
            Box::new(StartBinaryHandler::new(launcher)),
        )
        .with_handler(
            Action::ExportEnv,
            Box::new(ExportEnvHandler::new(config.home.clone())),
        )
        .with_handler(
            Action::SecurityEnv,
            Box::new(SecurityEnvHandler::new(
                config.tls_config_file.clone(),
                config.tls_mixed_mode.clone(),
            )),
        )
        .with_handler(
            Action::Ipv6Check,
            Box::new(Ipv6CheckHandler::new(Box::new(HostnameProbe::new(
                config.hostname.clone(),
            )))),
        )
        .with_handler(
            Action::FixConfigserverDirs,
            Box::new(FixDirsHandler::new(
                config.home.clone(),
                config.service_user.clone(),
            )),
        );

    for action in Action::LABELLED {
        let tool = ExternalTool::for_action(action, &config.subsystem_dir, &config.home);
        if let Some(tool) = tool {
            let handler = SubsystemHandler::new(Box::new(tool));
            dispatcher = dispatcher.with_handler(action, Box::new(handler));
        }
    }
    dispatcher
}
