//! Action resolution.
//!
//! The toolkit is installed as one binary reached through many names
//! (symlinks such as `vespa-logfmt`) or through the generic multiplexer name
//! followed by the action label (`script-utils ipv6-only`). This module turns
//! the raw argument vector into an [`Invocation`] and maps its label onto the
//! closed [`Action`] set.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;

/// Generic name under which the binary is installed.
pub const MULTIPLEXER_NAME: &str = "script-utils";

/// Closed set of actions one invocation can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    /// `start-c-binary`: wrap a native executable.
    NativeBinaryLaunch,
    /// `export-env`: print the default environment as shell.
    ExportEnv,
    /// `security-env`: print the TLS environment as shell.
    SecurityEnv,
    /// `ipv6-only`: succeed only on an IPv6-only host.
    Ipv6Check,
    /// `vespa-deploy`.
    Deploy,
    /// `vespa-logfmt`.
    LogFormat,
    /// `vespa-get-cluster-state`.
    GetClusterState,
    /// `vespa-get-node-state`.
    GetNodeState,
    /// `vespa-set-node-state`.
    SetNodeState,
    /// `fix-configserver-dirs`: reconcile ZooKeeper state ownership and modes.
    FixConfigserverDirs,
    /// Unknown label that the native-binary launcher recognised.
    LauncherFallback,
    /// Unknown label.
    Unknown,
}

impl Action {
    /// Every action reachable from a label, in the order they are listed in
    /// usage output.
    pub const LABELLED: [Self; 10] = [
        Self::NativeBinaryLaunch,
        Self::ExportEnv,
        Self::SecurityEnv,
        Self::Ipv6Check,
        Self::Deploy,
        Self::LogFormat,
        Self::GetClusterState,
        Self::GetNodeState,
        Self::SetNodeState,
        Self::FixConfigserverDirs,
    ];

    /// Map a label onto an action. Labels outside the table are
    /// [`Action::Unknown`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        Self::LABELLED
            .into_iter()
            .find(|action| action.label() == Some(label))
            .unwrap_or(Self::Unknown)
    }

    /// The invocation label for this action, if it has one.
    #[must_use]
    pub const fn label(self) -> Option<&'static str> {
        match self {
            Self::NativeBinaryLaunch => Some("start-c-binary"),
            Self::ExportEnv => Some("export-env"),
            Self::SecurityEnv => Some("security-env"),
            Self::Ipv6Check => Some("ipv6-only"),
            Self::Deploy => Some("vespa-deploy"),
            Self::LogFormat => Some("vespa-logfmt"),
            Self::GetClusterState => Some("vespa-get-cluster-state"),
            Self::GetNodeState => Some("vespa-get-node-state"),
            Self::SetNodeState => Some("vespa-set-node-state"),
            Self::FixConfigserverDirs => Some("fix-configserver-dirs"),
            Self::LauncherFallback | Self::Unknown => None,
        }
    }

    /// Whether this action forwards to an external subsystem.
    #[must_use]
    pub const fn is_delegated(self) -> bool {
        matches!(
            self,
            Self::Deploy
                | Self::LogFormat
                | Self::GetClusterState
                | Self::GetNodeState
                | Self::SetNodeState
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NativeBinaryLaunch => write!(f, "native-binary-launch"),
            Self::ExportEnv => write!(f, "export-env"),
            Self::SecurityEnv => write!(f, "security-env"),
            Self::Ipv6Check => write!(f, "ipv6-check"),
            Self::Deploy => write!(f, "deploy"),
            Self::LogFormat => write!(f, "log-format"),
            Self::GetClusterState => write!(f, "get-cluster-state"),
            Self::GetNodeState => write!(f, "get-node-state"),
            Self::SetNodeState => write!(f, "set-node-state"),
            Self::FixConfigserverDirs => write!(f, "fix-configserver-dirs"),
            Self::LauncherFallback => write!(f, "launcher-fallback"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A resolved invocation.
///
/// `args[0]` is the effective program name: the original argv[0] when the
/// binary was reached through a tool name, or the action label when it was
/// reached through [`MULTIPLEXER_NAME`]. Handlers see their own arguments in
/// `args[1..]`. Arguments are kept as raw OS strings so forwarding never
/// rewrites them; only the label is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Label the action was resolved from (lossily decoded).
    pub label: String,
    /// Resolved action (never [`Action::LauncherFallback`]; that is decided
    /// by the dispatcher).
    pub action: Action,
    /// Residual argument vector.
    pub args: Vec<OsString>,
}

impl Invocation {
    /// Resolve the full argument vector of the process (argv[0] first).
    #[must_use]
    pub fn resolve(argv: Vec<OsString>) -> Self {
        let multiplexed = argv.len() > 1
            && argv
                .first()
                .is_some_and(|name| basename(name) == OsStr::new(MULTIPLEXER_NAME));

        let args: Vec<OsString> = if multiplexed {
            argv.into_iter().skip(1).collect()
        } else {
            argv
        };
        let label = args.first().map_or_else(String::new, |name| {
            let name = if multiplexed { name.as_os_str() } else { basename(name) };
            name.to_string_lossy().into_owned()
        });

        Self {
            action: Action::from_label(&label),
            label,
            args,
        }
    }

    /// Effective program name (`args[0]`), or the empty string.
    #[must_use]
    pub fn program(&self) -> &OsStr {
        self.args.first().map_or(OsStr::new(""), OsString::as_os_str)
    }

    /// Arguments after the program name.
    #[must_use]
    pub fn handler_args(&self) -> &[OsString] {
        self.args.get(1..).unwrap_or_default()
    }
}

/// Final `/`-separated component of an invocation name.
fn basename(name: &OsStr) -> &OsStr {
    let bytes = name.as_bytes();
    bytes
        .rsplit(|b| *b == b'/')
        .next()
        .map_or(name, OsStr::from_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn multiplexer_name_consumes_first_argument_once() {
        let inv = Invocation::resolve(argv(&["script-utils", "ipv6-only", "--x"]));
        assert_eq!(inv.action, Action::Ipv6Check);
        assert_eq!(inv.label, "ipv6-only");
        assert_eq!(inv.args, argv(&["ipv6-only", "--x"]));
        assert_eq!(inv.handler_args(), &argv(&["--x"])[..]);
    }

    #[test]
    fn multiplexer_path_is_reduced_to_basename() {
        let inv = Invocation::resolve(argv(&["/opt/vespa/bin/script-utils", "export-env"]));
        assert_eq!(inv.action, Action::ExportEnv);
        assert_eq!(inv.args, argv(&["export-env"]));
    }

    #[test]
    fn tool_name_resolves_regardless_of_argument_count() {
        for extra in [0usize, 1, 5] {
            let mut raw = vec![OsString::from("/opt/vespa/bin/vespa-logfmt")];
            raw.extend((0..extra).map(|i| OsString::from(format!("-a{i}"))));
            let inv = Invocation::resolve(raw.clone());
            assert_eq!(inv.action, Action::LogFormat, "extra={extra}");
            assert_eq!(inv.args, raw, "tool invocations consume nothing");
        }
    }

    #[test]
    fn multiplexer_without_arguments_is_unknown() {
        let inv = Invocation::resolve(argv(&["script-utils"]));
        assert_eq!(inv.label, "script-utils");
        assert_eq!(inv.action, Action::Unknown);
        assert_eq!(inv.args, argv(&["script-utils"]));
    }

    #[test]
    fn empty_argv_is_unknown() {
        let inv = Invocation::resolve(Vec::new());
        assert_eq!(inv.label, "");
        assert_eq!(inv.action, Action::Unknown);
        assert_eq!(inv.program(), "");
        assert!(inv.handler_args().is_empty());
    }

    #[test]
    fn multiplexer_label_is_only_consumed_once() {
        let inv = Invocation::resolve(argv(&["script-utils", "script-utils", "ipv6-only"]));
        assert_eq!(inv.label, "script-utils");
        assert_eq!(inv.action, Action::Unknown);
        assert_eq!(inv.args, argv(&["script-utils", "ipv6-only"]));
    }

    #[test]
    fn non_utf8_arguments_are_kept_verbatim() {
        let raw = OsString::from(OsStr::from_bytes(b"caf\xe9"));
        let inv = Invocation::resolve(vec![
            OsString::from("script-utils"),
            OsString::from("start-c-binary"),
            raw.clone(),
        ]);
        assert_eq!(inv.action, Action::NativeBinaryLaunch);
        assert_eq!(inv.handler_args(), &[raw][..]);
    }

    #[test]
    fn non_utf8_tool_name_is_unknown() {
        let name = OsString::from(OsStr::from_bytes(b"/bin/vespa-\xff"));
        let inv = Invocation::resolve(vec![name.clone()]);
        assert_eq!(inv.action, Action::Unknown);
        assert_eq!(inv.program(), name.as_os_str());
        assert!(inv.label.starts_with("vespa-"));
    }

    #[test]
    fn every_label_round_trips() {
        for action in Action::LABELLED {
            let label = action.label().expect("labelled action");
            assert_eq!(Action::from_label(label), action);
        }
        assert_eq!(Action::from_label("foo"), Action::Unknown);
        assert_eq!(Action::LauncherFallback.label(), None);
    }

    #[test]
    fn delegated_actions() {
        let delegated: Vec<Action> = Action::LABELLED
            .into_iter()
            .filter(|a| a.is_delegated())
            .collect();
        assert_eq!(
            delegated,
            vec![
                Action::Deploy,
                Action::LogFormat,
                Action::GetClusterState,
                Action::GetNodeState,
                Action::SetNodeState,
            ]
        );
    }
}
