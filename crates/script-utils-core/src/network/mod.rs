//! IPv6-only detection.
//!
//! A host is IPv6-only when its own hostname resolves to at least one IPv6
//! address and no IPv4 address. Resolution failure counts as "not
//! IPv6-only".

use std::ffi::OsString;
use std::net::{IpAddr, ToSocketAddrs};

use crate::dispatch::Handler;
use crate::fault::{ExitOutcome, ToolError, exit_codes};

/// Environment variable overriding the hostname used by the probe.
pub const HOSTNAME_ENV_VAR: &str = "VESPA_HOSTNAME";

/// Synchronous reachability probe.
pub trait Ipv6Probe {
    /// Whether this host only has IPv6 addresses.
    fn has_only_ipv6(&self) -> bool;
}

/// [`Ipv6Probe`] resolving the local hostname through the system resolver.
#[derive(Debug, Clone, Default)]
pub struct HostnameProbe {
    hostname: Option<String>,
}

impl HostnameProbe {
    /// Probe `hostname`, or the system hostname when `None`.
    #[must_use]
    pub const fn new(hostname: Option<String>) -> Self {
        Self { hostname }
    }

    fn hostname(&self) -> Option<String> {
        if let Some(name) = self.hostname.as_ref().filter(|n| !n.is_empty()) {
            return Some(name.clone());
        }
        match nix::unistd::gethostname() {
            Ok(name) => name.into_string().ok(),
            Err(err) => {
                tracing::warn!(error = %err, "cannot determine hostname");
                None
            },
        }
    }
}

impl Ipv6Probe for HostnameProbe {
    fn has_only_ipv6(&self) -> bool {
        let Some(hostname) = self.hostname() else {
            return false;
        };
        match (hostname.as_str(), 0u16).to_socket_addrs() {
            Ok(addrs) => {
                let addrs: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
                tracing::debug!(hostname, ?addrs, "resolved own hostname");
                only_ipv6(&addrs)
            },
            Err(err) => {
                tracing::warn!(hostname, error = %err, "cannot resolve own hostname");
                false
            },
        }
    }
}

/// At least one IPv6 address and no IPv4 address.
#[must_use]
pub fn only_ipv6(addrs: &[IpAddr]) -> bool {
    addrs.iter().any(IpAddr::is_ipv6) && !addrs.iter().any(IpAddr::is_ipv4)
}

/// `ipv6-only` handler. Status 0 on an IPv6-only host, 1 otherwise.
pub struct Ipv6CheckHandler {
    probe: Box<dyn Ipv6Probe>,
}

impl Ipv6CheckHandler {
    /// Handler using `probe`.
    #[must_use]
    pub fn new(probe: Box<dyn Ipv6Probe>) -> Self {
        Self { probe }
    }
}

impl Handler for Ipv6CheckHandler {
    fn run(&self, _args: &[OsString]) -> Result<ExitOutcome, ToolError> {
        let code = if self.probe.has_only_ipv6() {
            exit_codes::SUCCESS
        } else {
            exit_codes::ERROR
        };
        Ok(ExitOutcome::status(code))
    }
}
