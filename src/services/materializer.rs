//! Idempotent symlink creation
//!
//! The filesystem side-effect at the end of the pipeline. Re-running a
//! scan must be a no-op for files that are already linked, repoint stale
//! links, and never clobber real files that happen to occupy a
//! destination.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// What happened to one destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new link (or directory copy) was created
    Created,
    /// A link to the same source already existed
    AlreadyLinked,
    /// A link to a different source was removed and recreated
    Replaced,
    /// A regular file or directory occupies the destination; left alone
    Skipped,
}

#[cfg(unix)]
fn symlink(source: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(windows)]
fn symlink(source: &Path, dest: &Path) -> io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, dest)
    } else {
        std::os::windows::fs::symlink_file(source, dest)
    }
}

/// Create a symlink from `dest` to `source`, or recursively copy when the
/// source is a directory. Safe to call repeatedly with the same arguments.
pub fn materialize(source: &Path, dest: &Path) -> Result<Outcome> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = fs::read_link(dest).context("Failed to read existing symlink")?;
            if target == source {
                info!(dest = %dest.display(), "Symlink already exists");
                return Ok(Outcome::AlreadyLinked);
            }
            fs::remove_file(dest).context("Failed to remove stale symlink")?;
            symlink(source, dest).context("Failed to recreate symlink")?;
            info!(
                dest = %dest.display(),
                old = %target.display(),
                new = %source.display(),
                "Replaced stale symlink"
            );
            return Ok(Outcome::Replaced);
        }
        Ok(_) => {
            warn!(dest = %dest.display(), "Destination occupied by a real file, skipping");
            return Ok(Outcome::Skipped);
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).context("Failed to stat destination"),
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).context("Failed to create destination directories")?;
    }

    if source.is_dir() {
        copy_tree(source, dest).context("Failed to copy directory source")?;
    } else {
        symlink(source, dest).context("Failed to create symlink")?;
    }

    debug!(dest = %dest.display(), source = %source.display(), "Created symlink");
    Ok(Outcome::Created)
}

/// Recursively copy a directory, recreating nested symlinks instead of
/// following them.
fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            let target = fs::read_link(&from)?;
            if fs::symlink_metadata(&to).is_ok() {
                fs::remove_file(&to)?;
            }
            symlink(&target, &to)?;
        } else if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}
