//! Untrusted archive extraction.
//!
//! Uploaded archives are hostile input. Every entry path is re-rooted under
//! the destination with lexical normalization, so `..` segments and absolute
//! paths can never write outside the extraction directory. Symlink and
//! hardlink entries abort the extraction outright; entry types the host has
//! no use for (FIFOs, devices, pax headers) are skipped silently.
//!
//! Extraction always targets a caller-owned temp directory, so a rejected
//! archive leaves no partial state behind once the caller drops it.
//!
//! Supported formats, chosen by the lowercased suffix of the original
//! upload name: `.zip`, `.tar`, `.tar.gz` / `.tgz`.

use crate::constants::MAX_ARCHIVE_ENTRIES;
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Extracts `archive_path` into `dest`, dispatching on the suffix of the
/// original upload name.
pub fn extract_archive(archive_path: &Path, original_name: &str, dest: &Path) -> Result<()> {
    let lowered = original_name.to_ascii_lowercase();
    if lowered.ends_with(".zip") {
        extract_zip(archive_path, dest)
    } else if lowered.ends_with(".tar.gz") || lowered.ends_with(".tgz") {
        extract_tar_gz(archive_path, dest)
    } else if lowered.ends_with(".tar") {
        extract_tar(archive_path, dest)
    } else {
        Err(Error::ArchiveFormat {
            name: original_name.to_string(),
        })
    }
}

/// Extracts a zip archive into `dest`.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::Extract {
        reason: format!("failed to read zip: {}", e),
    })?;

    if archive.len() > MAX_ARCHIVE_ENTRIES {
        return Err(Error::Extract {
            reason: format!("archive exceeds {} entries", MAX_ARCHIVE_ENTRIES),
        });
    }

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| Error::Extract {
            reason: format!("failed to read zip entry: {}", e),
        })?;
        let name = entry.name().to_string();

        // Zip stores symlinks as regular entries with S_IFLNK in the mode.
        if let Some(mode) = entry.unix_mode() {
            if mode & 0o170000 == 0o120000 {
                return Err(Error::SymlinkForbidden { path: name });
            }
        }

        let target = secure_join(dest, &name)?;

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if target == dest {
            return Err(Error::PathEscape { path: name });
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = create_with_mode(&target, entry.unix_mode().map(|m| m & 0o777))?;
        io::copy(&mut entry, &mut out).map_err(|e| Error::Extract {
            reason: format!("failed to write {}: {}", name, e),
        })?;
    }

    debug!(archive = %archive_path.display(), dest = %dest.display(), "zip extracted");
    Ok(())
}

/// Extracts an uncompressed tar archive into `dest`.
pub fn extract_tar(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    extract_tar_stream(file, dest)
}

/// Extracts a gzip-compressed tar archive into `dest`.
pub fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    extract_tar_stream(GzDecoder::new(file), dest)
}

/// Tar entry loop shared by upload extraction and checkpoint restore, so
/// both enforce identical containment rules.
pub(crate) fn extract_tar_stream<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    let mut entry_count = 0usize;

    for entry in archive.entries().map_err(|e| Error::Extract {
        reason: format!("failed to read tar: {}", e),
    })? {
        entry_count += 1;
        if entry_count > MAX_ARCHIVE_ENTRIES {
            return Err(Error::Extract {
                reason: format!("archive exceeds {} entries", MAX_ARCHIVE_ENTRIES),
            });
        }

        let mut entry = entry.map_err(|e| Error::Extract {
            reason: format!("failed to read tar entry: {}", e),
        })?;
        let name = entry
            .path()
            .map_err(|e| Error::Extract {
                reason: format!("invalid tar entry path: {}", e),
            })?
            .to_string_lossy()
            .into_owned();

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                let target = secure_join(dest, &name)?;
                fs::create_dir_all(&target)?;
            }
            tar::EntryType::Regular => {
                let target = secure_join(dest, &name)?;
                if target == dest {
                    return Err(Error::PathEscape { path: name });
                }
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mode = entry.header().mode().ok().map(|m| m & 0o777);
                let mut out = create_with_mode(&target, mode)?;
                io::copy(&mut entry, &mut out).map_err(|e| Error::Extract {
                    reason: format!("failed to write {}: {}", name, e),
                })?;
            }
            tar::EntryType::Symlink | tar::EntryType::Link => {
                return Err(Error::SymlinkForbidden { path: name });
            }
            // Pax/GNU headers, fifos, devices: nothing to materialize.
            _ => {}
        }
    }

    Ok(())
}

/// Joins an archive entry name onto `dest` with lexical normalization.
/// Rejects absolute paths and any `..` that would climb past `dest`.
fn secure_join(dest: &Path, name: &str) -> Result<PathBuf> {
    let mut out = dest.to_path_buf();
    let mut depth = 0usize;

    for comp in Path::new(name).components() {
        match comp {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(Error::PathEscape {
                        path: name.to_string(),
                    });
                }
                out.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::PathEscape {
                    path: name.to_string(),
                });
            }
        }
    }

    Ok(out)
}

#[cfg(unix)]
fn create_with_mode(path: &Path, mode: Option<u32>) -> Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    if let Some(mode) = mode {
        // A zero mode would produce an unreadable file; fall back to 0644.
        opts.mode(if mode == 0 { 0o644 } else { mode });
    }
    Ok(opts.open(path)?)
}

#[cfg(not(unix))]
fn create_with_mode(path: &Path, _mode: Option<u32>) -> Result<File> {
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}
