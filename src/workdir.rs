//! Working-directory lifecycle and solution-tree copy.
//!
//! Each run owns a working directory holding one subdirectory per container.
//! The directory is removed and recreated fresh every run; the caller is
//! responsible for confirming the removal with the user first.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;
use walkdir::WalkDir;

/// Remove any previous working directory and create a fresh, empty one.
pub fn reset_working_directory(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)
}

/// Recursively copy the solution tree at `source` into `destination`,
/// preserving the directory structure. `destination` is created if needed.
pub fn copy_tree(source: &Path, destination: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            debug!("Copying {} -> {}", entry.path().display(), target.display());
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
