//! Install root discovery.
//!
//! Precedence: `VESPA_HOME`, then the nearest ancestor of the running
//! executable that contains `libexec/vespa`, then [`DEFAULT_HOME`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable holding the install root.
pub const HOME_ENV_VAR: &str = "VESPA_HOME";

/// Install root when nothing else applies.
pub const DEFAULT_HOME: &str = "/opt/vespa";

/// Marker directory identifying an install root.
const HOME_MARKER: &str = "libexec/vespa";

/// Errors determining the install root.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HomeError {
    /// `VESPA_HOME` is set to a relative path.
    #[error("{HOME_ENV_VAR} must be an absolute path, got '{}'", .0.display())]
    NotAbsolute(PathBuf),
}

/// Determine the install root from the value of `VESPA_HOME` and the path of
/// the running executable.
///
/// # Errors
///
/// Returns [`HomeError::NotAbsolute`] when `env_home` is relative.
pub fn find_home_from(
    env_home: Option<OsString>,
    exe: Option<&Path>,
) -> Result<PathBuf, HomeError> {
    if let Some(value) = env_home.filter(|v| !v.is_empty()) {
        let home = PathBuf::from(value);
        if !home.is_absolute() {
            return Err(HomeError::NotAbsolute(home));
        }
        return Ok(home);
    }

    if let Some(home) = exe.and_then(home_from_executable) {
        tracing::debug!(home = %home.display(), "install root derived from executable");
        return Ok(home);
    }

    Ok(PathBuf::from(DEFAULT_HOME))
}

/// Nearest ancestor of `exe` that contains the install marker.
fn home_from_executable(exe: &Path) -> Option<PathBuf> {
    exe.ancestors()
        .skip(1)
        .find(|dir| dir.join(HOME_MARKER).is_dir())
        .map(Path::to_path_buf)
}
