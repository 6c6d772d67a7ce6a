//! TLS environment for `security-env`.
//!
//! The TLS config file (named by `VESPA_TLS_CONFIG_FILE`) is JSON:
//!
//! ```json
//! {
//!   "files": {
//!     "private-key": "/etc/vespa/tls/host.key",
//!     "certificates": "/etc/vespa/tls/host.pem",
//!     "ca-certificates": "/etc/vespa/tls/ca.pem"
//!   },
//!   "disable-hostname-validation": true
//! }
//! ```

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{EnvExportError, ShellEnv, write_shell};
use crate::dispatch::Handler;
use crate::fault::{ExitOutcome, ToolError};

/// Environment variable naming the TLS config file.
pub const TLS_CONFIG_FILE_ENV_VAR: &str = "VESPA_TLS_CONFIG_FILE";

/// Environment variable selecting insecure mixed mode.
pub const TLS_MIXED_MODE_ENV_VAR: &str = "VESPA_TLS_INSECURE_MIXED_MODE";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TlsConfig {
    #[serde(default)]
    files: TlsFiles,
    #[serde(default)]
    disable_hostname_validation: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TlsFiles {
    private_key: Option<String>,
    certificates: Option<String>,
    ca_certificates: Option<String>,
}

/// Build the TLS environment.
///
/// With no config file and no mixed mode the result is empty.
///
/// # Errors
///
/// Returns an [`EnvExportError`] when the config file cannot be read or
/// parsed.
pub fn security_env(
    config_file: Option<&Path>,
    mixed_mode: Option<&str>,
) -> Result<ShellEnv, EnvExportError> {
    let mut env = ShellEnv::new();

    let config = config_file.map(load_tls_config).transpose()?;
    if config.is_some() {
        env.export("VESPA_TLS_ENABLED", "1");
    }

    match mixed_mode.filter(|m| !m.is_empty()) {
        Some("plaintext_client_mixed_server") => env.export("VESPA_TLS_ENABLED", "0"),
        Some("tls_client_mixed_server") => env.export("VESPA_TLS_ENABLED", "1"),
        Some(other) => {
            tracing::warn!(mode = other, "unknown {TLS_MIXED_MODE_ENV_VAR} value, ignored");
        },
        None => {},
    }

    if let Some(config) = config {
        let files = config.files;
        if let Some(ca) = files.ca_certificates {
            env.export("VESPA_TLS_CA_CERT", ca);
        }
        if let Some(cert) = files.certificates {
            env.export("VESPA_TLS_CERT", cert);
        }
        if let Some(key) = files.private_key {
            env.export("VESPA_TLS_PRIVATE_KEY", key);
        }
        if config.disable_hostname_validation {
            env.export("VESPA_TLS_HOSTNAME_VALIDATION_DISABLED", "1");
        }
    }

    Ok(env)
}

fn load_tls_config(path: &Path) -> Result<TlsConfig, EnvExportError> {
    let content = std::fs::read_to_string(path).map_err(|source| EnvExportError::TlsConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| EnvExportError::TlsConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// `security-env` handler.
#[derive(Debug, Clone, Default)]
pub struct SecurityEnvHandler {
    config_file: Option<PathBuf>,
    mixed_mode: Option<String>,
}

impl SecurityEnvHandler {
    /// Handler for the given TLS settings.
    #[must_use]
    pub const fn new(config_file: Option<PathBuf>, mixed_mode: Option<String>) -> Self {
        Self {
            config_file,
            mixed_mode,
        }
    }
}

impl Handler for SecurityEnvHandler {
    fn run(&self, _args: &[OsString]) -> Result<ExitOutcome, ToolError> {
        let env = security_env(self.config_file.as_deref(), self.mixed_mode.as_deref())?;
        write_shell(&env, &mut io::stdout().lock())?;
        Ok(ExitOutcome::success())
    }
}
