//! Service user resolution.
//!
//! Vespa services run as a dedicated account (`vespa` by default, overridden
//! through `VESPA_USER`). The reconciler needs that account's uid and gid.
//! When the account does not exist on this host the identity is left
//! unresolved and ownership is not touched, only modes are enforced.
//!
//! # Invariants
//!
//! - The user name is validated before it reaches the passwd lookup.
//! - A missing passwd entry is not an error; a failing lookup is.

use std::fmt;

use nix::unistd::{Gid, Uid, User};
use thiserror::Error;

/// Environment variable naming the service user.
pub const SERVICE_USER_ENV_VAR: &str = "VESPA_USER";

/// Service user when `VESPA_USER` is unset or empty.
pub const DEFAULT_SERVICE_USER: &str = "vespa";

/// Maximum length for service user names.
const MAX_SERVICE_USER_LENGTH: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors resolving the service user.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentityError {
    /// The service user name is invalid.
    #[error("invalid service user name '{user}': {reason}")]
    InvalidServiceUser {
        /// The invalid user name.
        user: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The passwd lookup itself failed.
    #[error("passwd lookup for '{user}' failed: {source}")]
    Lookup {
        /// The user being looked up.
        user: String,
        /// Underlying errno.
        #[source]
        source: nix::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// The account the reconciler applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    /// Account name.
    pub user: String,
    /// Resolved uid, `None` when the account does not exist.
    pub uid: Option<Uid>,
    /// Resolved primary gid, `None` when the account does not exist.
    pub gid: Option<Gid>,
}

impl ServiceIdentity {
    /// Identity with nothing resolved; ownership stays untouched.
    #[must_use]
    pub fn unresolved(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            uid: None,
            gid: None,
        }
    }

    /// Whether the passwd entry was found.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.uid.is_some()
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.uid, self.gid) {
            (Some(uid), Some(gid)) => write!(f, "{} ({uid}:{gid})", self.user),
            _ => write!(f, "{} (unresolved)", self.user),
        }
    }
}

/// Resolves the service account.
pub trait IdentityResolver {
    /// Resolve the account named `user`.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] for an invalid name or a failing lookup.
    fn resolve(&self, user: &str) -> Result<ServiceIdentity, IdentityError>;
}

/// [`IdentityResolver`] backed by the system passwd database.
#[derive(Debug, Default, Clone, Copy)]
pub struct PasswdResolver;

impl IdentityResolver for PasswdResolver {
    fn resolve(&self, user: &str) -> Result<ServiceIdentity, IdentityError> {
        validate_service_user_syntax(user)?;

        match User::from_name(user) {
            Ok(Some(entry)) => {
                tracing::debug!(user, uid = %entry.uid, gid = %entry.gid, "resolved service user");
                Ok(ServiceIdentity {
                    user: user.to_string(),
                    uid: Some(entry.uid),
                    gid: Some(entry.gid),
                })
            },
            Ok(None) => {
                tracing::warn!(user, "could not find uid for service user, ownership left as is");
                Ok(ServiceIdentity::unresolved(user))
            },
            Err(source) => Err(IdentityError::Lookup {
                user: user.to_string(),
                source,
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// The configured service user name, or [`DEFAULT_SERVICE_USER`] when unset
/// or empty.
#[must_use]
pub fn service_user_or_default(configured: Option<String>) -> String {
    configured
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVICE_USER.to_string())
}

/// Minimal syntax validation for service user names.
fn validate_service_user_syntax(user: &str) -> Result<(), IdentityError> {
    let invalid = |reason: String| IdentityError::InvalidServiceUser {
        user: user.to_string(),
        reason,
    };

    let Some(first) = user.chars().next() else {
        return Err(invalid("empty service user name".to_string()));
    };
    if user.len() > MAX_SERVICE_USER_LENGTH {
        return Err(invalid(format!(
            "exceeds maximum length of {MAX_SERVICE_USER_LENGTH}"
        )));
    }
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(invalid("must start with a letter or underscore".to_string()));
    }
    if let Some((i, ch)) = user
        .char_indices()
        .skip(1)
        .find(|(_, ch)| !ch.is_ascii_alphanumeric() && *ch != '-' && *ch != '_' && *ch != '.')
    {
        return Err(invalid(format!(
            "invalid character '{ch}' at position {i}; \
             only alphanumeric, dot, dash, and underscore allowed"
        )));
    }
    Ok(())
}
