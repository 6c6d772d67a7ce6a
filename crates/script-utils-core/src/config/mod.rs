//! Per-run settings.
//!
//! The toolkit has no configuration file of its own; everything comes from
//! the environment the start scripts provide. [`ToolkitConfig`] reads it once
//! at start-up so handlers never consult the environment themselves (the
//! `fallback` directives of `export-env` being the one exception).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::env::security::{TLS_CONFIG_FILE_ENV_VAR, TLS_MIXED_MODE_ENV_VAR};
use crate::home::{DEFAULT_HOME, HOME_ENV_VAR, find_home_from};
use crate::identity::{SERVICE_USER_ENV_VAR, service_user_or_default};
use crate::network::HOSTNAME_ENV_VAR;

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV_VAR: &str = "SCRIPT_UTILS_LOG";

/// Filter used when [`LOG_ENV_VAR`] is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Environment variable overriding the subsystem directory.
pub const SUBSYSTEM_DIR_ENV_VAR: &str = "SCRIPT_UTILS_SUBSYSTEM_DIR";

/// Subsystem directory below the install root.
pub const DEFAULT_SUBSYSTEM_DIR: &str = "libexec/vespa/subsystems";

/// Settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolkitConfig {
    /// Install root.
    pub home: PathBuf,
    /// Service user name.
    pub service_user: String,
    /// Hostname override for the IPv6 probe.
    pub hostname: Option<String>,
    /// TLS config file for `security-env`.
    pub tls_config_file: Option<PathBuf>,
    /// TLS insecure mixed mode.
    pub tls_mixed_mode: Option<String>,
    /// Directory holding delegated subsystem programs.
    pub subsystem_dir: PathBuf,
}

impl ToolkitConfig {
    /// Read the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let exe = std::env::current_exe().ok();
        Self::from_lookup(|name| std::env::var_os(name), exe.as_deref())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// An unusable `VESPA_HOME` is logged and ignored; discovery then falls
    /// back to the executable location and finally to the default root.
    #[must_use]
    pub fn from_lookup<F>(lookup: F, exe: Option<&Path>) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let text = |name: &str| {
            lookup(name)
                .and_then(|v| v.into_string().ok())
                .filter(|v| !v.is_empty())
        };

        let home = find_home_from(lookup(HOME_ENV_VAR), exe).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring {HOME_ENV_VAR}");
            find_home_from(None, exe).unwrap_or_else(|_| PathBuf::from(DEFAULT_HOME))
        });
        let subsystem_dir = lookup(SUBSYSTEM_DIR_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map_or_else(|| home.join(DEFAULT_SUBSYSTEM_DIR), PathBuf::from);

        Self {
            service_user: service_user_or_default(text(SERVICE_USER_ENV_VAR)),
            hostname: text(HOSTNAME_ENV_VAR),
            tls_config_file: lookup(TLS_CONFIG_FILE_ENV_VAR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            tls_mixed_mode: text(TLS_MIXED_MODE_ENV_VAR),
            subsystem_dir,
            home,
        }
    }
}
