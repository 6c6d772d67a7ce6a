//! Ownership and mode reconciliation for service state directories.
//!
//! Before the configserver starts, its ZooKeeper state must belong to the
//! service user with fixed modes. [`apply`] walks every declared directory of
//! a [`PathSet`] recursively and every declared file individually, and moves
//! each node to the absolute target described by a [`PermissionPolicy`].
//!
//! # Invariants
//!
//! - Directories get `directory_mode`, regular files get `file_mode`. Never
//!   the other way round.
//! - Ownership and mode are only written when they differ from the target,
//!   so a second [`apply`] changes nothing.
//! - Nothing is created. An absent declared path is skipped.
//! - Symlinks below a declared directory are neither followed nor modified.
//!   Sockets, FIFOs and device nodes are left alone.

use std::fs::{self, Metadata, Permissions};
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid};
use thiserror::Error;
use walkdir::WalkDir;

use crate::identity::ServiceIdentity;

/// Mode applied to reconciled directories.
pub const DIRECTORY_MODE: u32 = 0o755;

/// Mode applied to reconciled regular files.
pub const FILE_MODE: u32 = 0o644;

/// Permission bits compared and written (includes setuid/setgid/sticky).
const MODE_MASK: u32 = 0o7777;

/// ZooKeeper state owned by the configserver, relative to the install root.
///
/// The `conf/zookeeper` entries are legacy locations kept until the
/// configserver only writes to `var/zookeeper/conf`.
pub const CONFIGSERVER_PATHS: PathSet = PathSet::new(
    &[
        "conf/zookeeper",
        "var/zookeeper",
        "var/zookeeper/conf",
        "var/zookeeper/version-2",
    ],
    &[
        "conf/zookeeper/zookeeper.cfg",
        "var/zookeeper/conf/zookeeper.cfg",
        "var/zookeeper/myid",
    ],
);

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from reconciliation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PermissionError {
    /// Metadata of a node could not be read.
    #[error("cannot read metadata for {}: {source}", path.display())]
    Metadata {
        /// Node path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Walking a declared directory failed.
    #[error("cannot walk {}: {source}", path.display())]
    Walk {
        /// Declared directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: walkdir::Error,
    },

    /// A declared directory exists but is not a directory.
    #[error("{} is declared as a directory but is not one", path.display())]
    NotADirectory {
        /// Declared path.
        path: PathBuf,
    },

    /// A declared file exists but is not a regular file.
    #[error("{} is declared as a file but is not a regular file", path.display())]
    NotAFile {
        /// Declared path.
        path: PathBuf,
    },

    /// Changing ownership failed.
    #[error("chown {} to {uid:?}:{gid:?} failed: {source}", path.display())]
    Chown {
        /// Node path.
        path: PathBuf,
        /// Target uid (`None` = unchanged).
        uid: Option<u32>,
        /// Target gid (`None` = unchanged).
        gid: Option<u32>,
        /// Underlying errno.
        #[source]
        source: nix::Error,
    },

    /// Changing mode bits failed.
    #[error("chmod {} to {mode:o} failed: {source}", path.display())]
    Chmod {
        /// Node path.
        path: PathBuf,
        /// Target mode.
        mode: u32,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy and Path Set
// ─────────────────────────────────────────────────────────────────────────────

/// Target ownership and modes. Built once per run, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionPolicy {
    owner: Option<Uid>,
    group: Option<Gid>,
    directory_mode: u32,
    file_mode: u32,
}

impl PermissionPolicy {
    /// Create a policy. `None` owner or group leaves that id untouched.
    #[must_use]
    pub const fn new(
        owner: Option<Uid>,
        group: Option<Gid>,
        directory_mode: u32,
        file_mode: u32,
    ) -> Self {
        Self {
            owner,
            group,
            directory_mode: directory_mode & MODE_MASK,
            file_mode: file_mode & MODE_MASK,
        }
    }

    /// The fixed service policy (`0755` directories, `0644` files) for the
    /// resolved identity.
    #[must_use]
    pub const fn for_identity(identity: &ServiceIdentity) -> Self {
        Self::new(identity.uid, identity.gid, DIRECTORY_MODE, FILE_MODE)
    }

    /// Target owner.
    #[must_use]
    pub const fn owner(&self) -> Option<Uid> {
        self.owner
    }

    /// Target group.
    #[must_use]
    pub const fn group(&self) -> Option<Gid> {
        self.group
    }

    /// Mode for directories.
    #[must_use]
    pub const fn directory_mode(&self) -> u32 {
        self.directory_mode
    }

    /// Mode for regular files.
    #[must_use]
    pub const fn file_mode(&self) -> u32 {
        self.file_mode
    }
}

/// Declared locations, relative to an install root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathSet {
    directories: &'static [&'static str],
    files: &'static [&'static str],
}

impl PathSet {
    /// Declare directories (reconciled recursively) and files.
    #[must_use]
    pub const fn new(directories: &'static [&'static str], files: &'static [&'static str]) -> Self {
        Self { directories, files }
    }

    /// Declared directories.
    #[must_use]
    pub const fn directories(&self) -> &'static [&'static str] {
        self.directories
    }

    /// Declared files.
    #[must_use]
    pub const fn files(&self) -> &'static [&'static str] {
        self.files
    }
}

/// Summary of one [`apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Nodes whose ownership and mode were compared.
    pub visited: usize,
    /// Nodes that needed at least one change.
    pub changed: usize,
    /// Declared paths that do not exist.
    pub skipped_missing: Vec<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconciliation
// ─────────────────────────────────────────────────────────────────────────────

/// Enforce `policy` on every node of `paths` under `root`.
///
/// # Errors
///
/// Returns a [`PermissionError`] when a declared path has the wrong kind, when
/// metadata cannot be read, or when `chown`/`chmod` fails. Nodes processed
/// before the failure keep their new state.
pub fn apply(
    policy: &PermissionPolicy,
    paths: &PathSet,
    root: &Path,
) -> Result<ReconcileReport, PermissionError> {
    let mut report = ReconcileReport::default();

    for relative in paths.directories() {
        let dir = root.join(relative);
        let Some(metadata) = declared_metadata(&dir, &mut report)? else {
            continue;
        };
        if !metadata.is_dir() {
            return Err(PermissionError::NotADirectory { path: dir });
        }

        reconcile_tree(policy, &dir, 0, &mut report)?;
    }

    for relative in paths.files() {
        let file = root.join(relative);
        let Some(metadata) = declared_metadata(&file, &mut report)? else {
            continue;
        };
        if !metadata.is_file() {
            return Err(PermissionError::NotAFile { path: file });
        }
        reconcile_node(policy, &file, &metadata, policy.file_mode(), &mut report)?;
    }

    tracing::info!(
        root = %root.display(),
        visited = report.visited,
        changed = report.changed,
        skipped = report.skipped_missing.len(),
        "reconciled ownership and modes"
    );
    Ok(report)
}

/// Reconcile `top` and everything below it, starting at `min_depth`.
///
/// walkdir opens a directory before yielding it, so a directory that was not
/// readable fails to open even though its entry is fixed right afterwards. In
/// that case the directory is walked again now that its mode allows it.
fn reconcile_tree(
    policy: &PermissionPolicy,
    top: &Path,
    min_depth: usize,
    report: &mut ReconcileReport,
) -> Result<(), PermissionError> {
    let mut last_dir: Option<PathBuf> = None;

    for entry in WalkDir::new(top).min_depth(min_depth).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => match reopenable(&err, last_dir.as_deref()) {
                Some(path) => {
                    tracing::debug!(
                        path = %path.display(),
                        "re-opening directory after fixing its mode"
                    );
                    reconcile_tree(policy, &path, 1, report)?;
                    continue;
                },
                None => {
                    return Err(PermissionError::Walk {
                        path: err.path().unwrap_or(top).to_path_buf(),
                        source: err,
                    });
                },
            },
        };

        let file_type = entry.file_type();
        let mode = if file_type.is_dir() {
            policy.directory_mode()
        } else if file_type.is_file() {
            policy.file_mode()
        } else {
            tracing::trace!(path = %entry.path().display(), "skipping non-regular node");
            continue;
        };
        let metadata = entry.metadata().map_err(|source| PermissionError::Walk {
            path: entry.path().to_path_buf(),
            source,
        })?;
        reconcile_node(policy, entry.path(), &metadata, mode, report)?;
        last_dir = file_type.is_dir().then(|| entry.into_path());
    }
    Ok(())
}

/// The directory to walk again when `err` is the permission failure of
/// opening `fixed`, the directory reconciled just before.
fn reopenable(err: &walkdir::Error, fixed: Option<&Path>) -> Option<PathBuf> {
    let denied = err
        .io_error()
        .is_some_and(|io| io.kind() == io::ErrorKind::PermissionDenied);
    match (err.path(), fixed) {
        (Some(path), Some(fixed)) if denied && path == fixed => Some(path.to_path_buf()),
        _ => None,
    }
}

/// Metadata for a declared path, following a symlink at the declared
/// location itself. `None` when the path is absent.
fn declared_metadata(
    path: &Path,
    report: &mut ReconcileReport,
) -> Result<Option<Metadata>, PermissionError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "declared path absent, skipping");
            report.skipped_missing.push(path.to_path_buf());
            Ok(None)
        },
        Err(source) => Err(PermissionError::Metadata {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Move one node to the policy's owner and `mode`.
fn reconcile_node(
    policy: &PermissionPolicy,
    path: &Path,
    metadata: &Metadata,
    mode: u32,
    report: &mut ReconcileReport,
) -> Result<(), PermissionError> {
    report.visited += 1;
    let mut changed = false;

    let uid = policy.owner().filter(|uid| uid.as_raw() != metadata.uid());
    let gid = policy.group().filter(|gid| gid.as_raw() != metadata.gid());
    if uid.is_some() || gid.is_some() {
        nix::unistd::chown(path, uid, gid).map_err(|source| PermissionError::Chown {
            path: path.to_path_buf(),
            uid: uid.map(Uid::as_raw),
            gid: gid.map(Gid::as_raw),
            source,
        })?;
        changed = true;
    }

    // chown may clear setuid/setgid, so the mode is written afterwards.
    if metadata.permissions().mode() & MODE_MASK != mode {
        fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|source| {
            PermissionError::Chmod {
                path: path.to_path_buf(),
                mode,
                source,
            }
        })?;
        changed = true;
    }

    if changed {
        report.changed += 1;
        tracing::debug!(path = %path.display(), mode = format_args!("{mode:o}"), "fixed node");
    }
    Ok(())
}
