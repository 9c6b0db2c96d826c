//! Post-extraction directory normalization.
//!
//! Site archives are commonly packed with a single wrapping folder
//! (`my-site/index.html` instead of `index.html`). When the extraction
//! directory holds exactly one visible entry and it is a directory, its
//! contents are hoisted into a fresh staging directory; in every other case
//! the extraction directory is returned untouched. Hidden entries and the
//! macOS `__MACOSX` folder are invisible to the heuristic.
//!
//! The caller owns cleanup of whichever directory it did not receive back.

use crate::constants::MACOS_METADATA_DIR;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Flattens a single wrapping top-level folder, if present.
///
/// Returns the directory the caller should deploy from: either `extract_dir`
/// itself or a newly created temp directory holding the hoisted contents.
pub fn normalize_directory(extract_dir: &Path) -> Result<PathBuf> {
    let mut visible = Vec::new();
    for entry in fs::read_dir(extract_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name == MACOS_METADATA_DIR {
            continue;
        }
        visible.push(entry);
    }

    // An empty site is legal; multiple top-level entries need no hoisting.
    if visible.len() != 1 || !visible[0].path().is_dir() {
        return Ok(extract_dir.to_path_buf());
    }

    let wrapper = visible[0].path();
    let normalized = tempfile::Builder::new()
        .prefix("deploy-normalized-")
        .tempdir()
        .map_err(|e| Error::Extract {
            reason: format!("failed to create staging directory: {}", e),
        })?
        .keep();

    if let Err(e) = move_directory_contents(&wrapper, &normalized) {
        let _ = fs::remove_dir_all(&normalized);
        return Err(e);
    }

    debug!(wrapper = %wrapper.display(), "flattened single top-level folder");
    Ok(normalized)
}

/// Moves every child of `src` into `dst`. Rename first; fall back to
/// copy-then-delete when the rename crosses a filesystem boundary.
pub fn move_directory_contents(src: &Path, dst: &Path) -> Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if fs::rename(&src_path, &dst_path).is_ok() {
            continue;
        }

        if src_path.is_dir() {
            copy_directory(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
        if src_path.is_dir() {
            fs::remove_dir_all(&src_path)?;
        } else {
            fs::remove_file(&src_path)?;
        }
    }
    Ok(())
}

/// Recursively copies a directory tree.
fn copy_directory(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_directory(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}
