//! `fix-configserver-dirs`: enforce ownership and modes on the configserver's
//! ZooKeeper state before the service starts.
//!
//! ```text
//! script-utils fix-configserver-dirs [--home DIR] [--user NAME]
//! ```

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind;
use script_utils_core::home::HomeError;
use script_utils_core::identity::{IdentityResolver, PasswdResolver};
use script_utils_core::permissions::{self, CONFIGSERVER_PATHS, PermissionPolicy};
use script_utils_core::{ExitOutcome, Handler, ToolError};

const ACTION: &str = "fix-configserver-dirs";

/// Fix ownership and permissions of configserver state directories
#[derive(Parser, Debug, PartialEq, Eq)]
#[command(name = "fix-configserver-dirs", disable_version_flag = true)]
struct FixDirsArgs {
    /// Install root (defaults to VESPA_HOME)
    #[arg(long, value_name = "DIR")]
    home: Option<PathBuf>,

    /// Service user (defaults to VESPA_USER, then vespa)
    #[arg(long, value_name = "NAME")]
    user: Option<String>,
}

/// Handler for `fix-configserver-dirs`.
pub struct FixDirsHandler<R = PasswdResolver> {
    home: PathBuf,
    service_user: String,
    resolver: R,
}

impl FixDirsHandler {
    /// Handler using the passwd database, with defaults taken from the run
    /// configuration.
    pub fn new(home: PathBuf, service_user: String) -> Self {
        Self::with_resolver(home, service_user, PasswdResolver)
    }
}

impl<R: IdentityResolver> FixDirsHandler<R> {
    /// Handler with a custom identity resolver.
    pub fn with_resolver(home: PathBuf, service_user: String, resolver: R) -> Self {
        Self {
            home,
            service_user,
            resolver,
        }
    }
}

impl<R: IdentityResolver> Handler for FixDirsHandler<R> {
    fn run(&self, args: &[OsString]) -> Result<ExitOutcome, ToolError> {
        let argv = std::iter::once(OsString::from(ACTION)).chain(args.iter().cloned());
        let parsed = match FixDirsArgs::try_parse_from(argv) {
            Ok(parsed) => parsed,
            Err(err) if err.kind() == ErrorKind::DisplayHelp => {
                let mut stdout = io::stdout().lock();
                write!(stdout, "{err}").map_err(ToolError::Output)?;
                stdout.flush().map_err(ToolError::Output)?;
                return Ok(ExitOutcome::success());
            },
            Err(err) => {
                return Err(ToolError::InvalidArguments {
                    action: ACTION,
                    message: parse_message(&err.to_string()),
                });
            },
        };

        let home = parsed.home.unwrap_or_else(|| self.home.clone());
        if !home.is_absolute() {
            return Err(HomeError::NotAbsolute(home).into());
        }
        let user = parsed.user.unwrap_or_else(|| self.service_user.clone());

        let identity = self.resolver.resolve(&user)?;
        let policy = PermissionPolicy::for_identity(&identity);
        tracing::debug!(
            %identity,
            resolved = identity.is_resolved(),
            home = %home.display(),
            "fixing configserver directories"
        );

        let report = permissions::apply(&policy, &CONFIGSERVER_PATHS, &home)?;
        tracing::debug!(changed = report.changed, visited = report.visited, "done");
        Ok(ExitOutcome::success())
    }
}

/// First line of a clap error, without its `error: ` prefix.
fn parse_message(rendered: &str) -> String {
    let first = rendered.lines().next().unwrap_or_default().trim();
    first.strip_prefix("error: ").unwrap_or(first).to_string()
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use std::path::Path;

    use nix::unistd::{Gid, Uid, getegid, geteuid};
    use script_utils_core::identity::{IdentityError, ServiceIdentity};

    use super::*;

    /// Resolves every name to the current effective user.
    struct SelfResolver;

    impl IdentityResolver for SelfResolver {
        fn resolve(&self, user: &str) -> Result<ServiceIdentity, IdentityError> {
            Ok(ServiceIdentity {
                user: user.to_string(),
                uid: Some(geteuid()),
                gid: Some(getegid()),
            })
        }
    }

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    fn handler<R: IdentityResolver>(home: &Path, resolver: R) -> FixDirsHandler<R> {
        FixDirsHandler::with_resolver(home.to_path_buf(), "svc".into(), resolver)
    }

    fn mode(path: &Path) -> u32 {
        std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    #[test]
    fn parses_home_and_user() {
        let parsed =
            FixDirsArgs::try_parse_from(["x", "--home", "/srv/vespa", "--user", "svc"]).unwrap();
        assert_eq!(
            parsed,
            FixDirsArgs {
                home: Some(PathBuf::from("/srv/vespa")),
                user: Some("svc".to_string()),
            }
        );
        assert_eq!(FixDirsArgs::try_parse_from(["x"]).unwrap().home, None);
    }

    #[test]
    fn malformed_arguments_are_classified() {
        let handler = handler(Path::new("/nonexistent"), SelfResolver);
        let err = handler.run(&args(&["--bogus"])).unwrap_err();
        match err {
            ToolError::InvalidArguments { action, message } => {
                assert_eq!(action, ACTION);
                assert!(message.contains("--bogus"), "{message}");
                assert!(!message.contains('\n'));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_utf8_user_is_classified() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let handler = handler(Path::new("/nonexistent"), SelfResolver);
        let flags = [OsString::from("--user"), OsStr::from_bytes(b"v\xffa").to_os_string()];
        let err = handler.run(&flags).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }), "{err}");
    }

    #[test]
    fn relative_home_is_rejected() {
        let handler = handler(Path::new("/nonexistent"), SelfResolver);
        let err = handler.run(&args(&["--home", "vespa"])).unwrap_err();
        assert!(matches!(err, ToolError::Home(_)), "{err}");
    }

    #[test]
    fn reconciles_configserver_tree() {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let zk = dir.path().join("var/zookeeper");
        std::fs::create_dir_all(zk.join("version-2")).unwrap();
        std::fs::write(zk.join("version-2/log.1"), b"x").unwrap();
        std::fs::set_permissions(&zk, std::fs::Permissions::from_mode(0o700)).unwrap();
        let log = zk.join("version-2/log.1");
        std::fs::set_permissions(&log, std::fs::Permissions::from_mode(0o600)).unwrap();

        let outcome = handler(dir.path(), SelfResolver).run(&[]).unwrap();

        assert!(outcome.is_success());
        assert_eq!(mode(&zk), 0o755);
        assert_eq!(mode(&zk.join("version-2/log.1")), 0o644);
    }

    #[test]
    fn home_flag_overrides_configured_home() {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let zk = dir.path().join("var/zookeeper");
        std::fs::create_dir_all(&zk).unwrap();
        std::fs::set_permissions(&zk, std::fs::Permissions::from_mode(0o700)).unwrap();

        let handler = handler(Path::new("/nonexistent"), SelfResolver);
        let flags = [OsString::from("--home"), dir.path().as_os_str().to_os_string()];
        handler.run(&flags).unwrap();

        assert_eq!(mode(&zk), 0o755);
    }

    #[test]
    fn unresolvable_user_still_fixes_modes() {
        struct Missing;
        impl IdentityResolver for Missing {
            fn resolve(&self, user: &str) -> Result<ServiceIdentity, IdentityError> {
                Ok(ServiceIdentity::unresolved(user))
            }
        }

        let dir = tempfile::TempDir::new().expect("create temp dir");
        let zk = dir.path().join("var/zookeeper");
        std::fs::create_dir_all(&zk).unwrap();
        std::fs::set_permissions(&zk, std::fs::Permissions::from_mode(0o711)).unwrap();
        let before = std::fs::metadata(&zk).unwrap();

        handler(dir.path(), Missing).run(&[]).unwrap();

        let after = std::fs::metadata(&zk).unwrap();
        assert_eq!(mode(&zk), 0o755);
        assert_eq!(Uid::from_raw(after.uid()), Uid::from_raw(before.uid()));
        assert_eq!(Gid::from_raw(after.gid()), Gid::from_raw(before.gid()));
    }

    #[test]
    fn parse_message_strips_prefix() {
        assert_eq!(
            parse_message("error: unexpected argument '--x' found\n\nUsage: ..."),
            "unexpected argument '--x' found"
        );
    }
}
