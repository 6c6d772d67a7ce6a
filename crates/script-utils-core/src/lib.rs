#![allow(clippy::doc_markdown)]

//! script-utils-core - multiplexer library for the Vespa operational toolkit
//!
//! One executable plays many tools depending on how it is invoked. This
//! library owns the pieces with real logic: resolving the invocation into an
//! [`action::Action`], dispatching it to exactly one handler, classifying the
//! outcome at a single top-level boundary, and reconciling ownership and
//! modes on the configserver's ZooKeeper state directories.
//!
//! # Modules
//!
//! - [`action`]: invocation name / first-argument resolution
//! - [`dispatch`]: handler table and the unknown-action fallback
//! - [`fault`]: classified errors, `ExitOutcome` and the fault boundary
//! - [`permissions`]: `PermissionPolicy`, `PathSet` and the reconciler
//! - [`identity`]: service user lookup
//! - [`home`]: install root discovery
//! - [`env`]: `export-env` / `security-env` shell rendering
//! - [`network`]: IPv6-only probe
//! - [`launcher`]: native-binary launcher (`<program>-bin`)
//! - [`subsystem`]: delegated external tools (deploy, logfmt, cluster state)
//! - [`config`]: per-run settings read from the environment

pub mod action;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod fault;
pub mod home;
pub mod identity;
pub mod launcher;
pub mod network;
pub mod permissions;
pub mod subsystem;

pub use action::{Action, Invocation, MULTIPLEXER_NAME};
pub use config::ToolkitConfig;
pub use dispatch::{Dispatcher, Handler};
pub use fault::{ExitOutcome, FaultBoundary, ToolError};
