//! Atomic directory replacement.
//!
//! A deploy must never leave the live root half-written. The swap is two
//! renames: the live tree moves aside to a timestamped backup, the staged
//! tree moves into place. Any observer opening the live path sees either the
//! old tree or the new one, nothing in between. If the second rename fails,
//! the backup is renamed back before the error surfaces; if the restore
//! fails too, the site is left broken and the error says so.
//!
//! Renames are retried with a growing delay to ride out transient
//! filesystem locks, which Windows produces under concurrent reads.

use crate::constants::{RESTORE_MAX_RETRIES, SWAP_MAX_RETRIES, SWAP_RETRY_DELAY};
use crate::error::{Error, Result};
use chrono::Utc;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Replaces `live` with `staged`. On success `staged` no longer exists (it
/// became `live`) and the backup of the previous tree has been removed.
pub fn atomic_replace_directory(live: &Path, staged: &Path) -> Result<()> {
    if let Some(parent) = live.parent() {
        fs::create_dir_all(parent)?;
    }

    let backup = live.with_file_name(format!(
        "{}.backup.{}",
        live.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Utc::now().timestamp()
    ));

    let had_previous = live.exists();
    if had_previous {
        rename_with_retry(live, &backup, SWAP_MAX_RETRIES).map_err(|e| Error::SwapFailed {
            path: live.to_path_buf(),
            reason: format!("failed to move previous tree aside: {}", e),
        })?;
    }

    if let Err(swap_err) = rename_with_retry(staged, live, SWAP_MAX_RETRIES) {
        if had_previous {
            match rename_with_retry(&backup, live, RESTORE_MAX_RETRIES) {
                Ok(()) => {
                    return Err(Error::SwapFailed {
                        path: live.to_path_buf(),
                        reason: format!("{} (previous tree restored)", swap_err),
                    });
                }
                Err(restore_err) => {
                    return Err(Error::SwapFailed {
                        path: live.to_path_buf(),
                        reason: format!(
                            "{}; backup restore also failed: {}",
                            swap_err, restore_err
                        ),
                    });
                }
            }
        }
        return Err(Error::SwapFailed {
            path: live.to_path_buf(),
            reason: swap_err.to_string(),
        });
    }

    // The backup is only disposable once the new tree is in place.
    if had_previous {
        if let Err(e) = fs::remove_dir_all(&backup) {
            warn!(backup = %backup.display(), error = %e, "failed to remove swap backup");
        }
    }

    debug!(live = %live.display(), "site root swapped");
    Ok(())
}

/// Renames `src` to `dst`, retrying with a backoff of `delay × attempt`.
fn rename_with_retry(src: &Path, dst: &Path, max_retries: u32) -> std::io::Result<()> {
    let mut last_err = None;
    for attempt in 1..=max_retries {
        match fs::rename(src, dst) {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
        if attempt < max_retries {
            std::thread::sleep(SWAP_RETRY_DELAY * attempt);
        }
    }
    Err(last_err.unwrap_or_else(|| std::io::Error::other("rename failed")))
}
