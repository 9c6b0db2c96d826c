//! Checkpoint engine.
//!
//! Every deploy snapshots the outgoing site root into a content-addressed
//! tar.gz archive before it is replaced, giving each site a trail of
//! rollback points. Per site, a `metadata.json` document tracks the
//! checkpoint list, the `current` pointer, and a cached storage-usage
//! summary:
//!
//! ```text
//! {base}/{username}/{site_id}/metadata.json
//!                            /checkpoints/{checkpoint_id}.tar.gz
//! ```
//!
//! Checkpoint ids are `{YYYYMMDD-HHMMSS}-{sha256-prefix8}`: monotonic by
//! construction, collision-resistant by hash. Directory walks sort entries
//! at every level, so identical trees produce identical hashes regardless
//! of filesystem readdir order.
//!
//! Checkout restores files and moves the `current` pointer; it never creates
//! a new checkpoint. That keeps forward and backward transitions symmetric
//! and cheap, unlike VCS semantics.
//!
//! All mutating operations on one site serialize on a per-`(username, id)`
//! lock. Distinct sites proceed in parallel.

use crate::constants::{
    CHECKPOINT_ARCHIVE_EXT, CHECKPOINT_HASH_LEN, CHECKPOINT_TIMESTAMP_FORMAT, CHECKPOINTS_SUBDIR,
    METADATA_FILE,
};
use crate::error::{Error, Result};
use crate::extract;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

// =============================================================================
// Records
// =============================================================================

/// What triggered a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    Deploy,
    Manual,
}

/// A full archived snapshot of a site root at a point in time.
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub file_size: u64,
    /// Original upload name the deploy was made from.
    pub file_name: String,
    pub source: CheckpointSource,
    pub description: String,
}

/// Per-site checkpoint metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteCheckpointMetadata {
    pub site_id: String,
    pub username: String,
    /// Id of the checkpoint matching the live root; empty when none.
    #[serde(default)]
    pub current: String,
    pub checkpoints: Vec<Checkpoint>,
    /// Cached usage summary; `None` forces a recount on next read.
    #[serde(default)]
    pub storage_usage: Option<DiskUsage>,
    pub updated_at: DateTime<Utc>,
}

/// Storage usage summary for one site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub deployed_size: u64,
    pub checkpoints_size: u64,
    pub total_size: u64,
    pub deployed_size_h: String,
    pub checkpoints_size_h: String,
    pub total_size_h: String,
    pub file_count: u64,
    pub checkpoint_count: u64,
}

/// Formats a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < UNITS.len() - 1 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.2} {}", bytes as f64 / div as f64, UNITS[exp])
}

// =============================================================================
// Manager
// =============================================================================

type SiteKey = (String, String);

/// Owns per-site checkpoint metadata and archives.
pub struct CheckpointManager {
    base_dir: PathBuf,
    /// Serializes Create / Checkout / Delete / recount per site.
    site_locks: Mutex<HashMap<SiteKey, Arc<Mutex<()>>>>,
}

impl CheckpointManager {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            site_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The lock serializing all checkpoint mutations for one site. The
    /// deploy pipeline holds it across snapshot + swap + recount so two
    /// deploys of the same site cannot interleave.
    pub fn site_lock(&self, username: &str, site_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.site_locks.lock().expect("site lock map poisoned");
        locks
            .entry((username.to_string(), site_id.to_string()))
            .or_default()
            .clone()
    }

    // -------------------------------------------------------------------------
    // Paths
    // -------------------------------------------------------------------------

    fn site_dir(&self, username: &str, site_id: &str) -> PathBuf {
        self.base_dir.join(username).join(site_id)
    }

    fn checkpoints_dir(&self, username: &str, site_id: &str) -> PathBuf {
        self.site_dir(username, site_id).join(CHECKPOINTS_SUBDIR)
    }

    fn archive_path(&self, username: &str, site_id: &str, checkpoint_id: &str) -> PathBuf {
        self.checkpoints_dir(username, site_id)
            .join(format!("{}{}", checkpoint_id, CHECKPOINT_ARCHIVE_EXT))
    }

    fn metadata_path(&self, username: &str, site_id: &str) -> PathBuf {
        self.site_dir(username, site_id).join(METADATA_FILE)
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Packs `source_root` into a new checkpoint and makes it `current`.
    pub fn create(
        &self,
        username: &str,
        site_id: &str,
        source_root: &Path,
        original_file_name: &str,
    ) -> Result<Checkpoint> {
        let lock = self.site_lock(username, site_id);
        let _guard = lock.lock().expect("site lock poisoned");
        self.create_locked(username, site_id, source_root, original_file_name)
    }

    /// Create with the site lock already held by the caller.
    pub(crate) fn create_locked(
        &self,
        username: &str,
        site_id: &str,
        source_root: &Path,
        original_file_name: &str,
    ) -> Result<Checkpoint> {
        fs::create_dir_all(self.checkpoints_dir(username, site_id))?;

        let now = Utc::now();
        let hash = hash_directory(source_root)?;
        let checkpoint_id = format!(
            "{}-{}",
            now.format(CHECKPOINT_TIMESTAMP_FORMAT),
            &hash[..CHECKPOINT_HASH_LEN]
        );

        let archive_path = self.archive_path(username, site_id, &checkpoint_id);
        pack_directory(source_root, &archive_path)?;

        let file_size = fs::metadata(&archive_path)
            .map_err(|e| {
                let _ = fs::remove_file(&archive_path);
                Error::Checkpoint {
                    reason: format!("failed to stat archive: {}", e),
                }
            })?
            .len();

        let checkpoint = Checkpoint {
            id: checkpoint_id.clone(),
            created_at: now,
            file_size,
            file_name: original_file_name.to_string(),
            source: CheckpointSource::Deploy,
            description: format!("deploy: {}", original_file_name),
        };

        // The archive is useless without a metadata row; unlink it on any
        // failure past this point.
        let mut metadata = match self.load_metadata(username, site_id) {
            Ok(m) => m,
            Err(e) => {
                let _ = fs::remove_file(&archive_path);
                return Err(e);
            }
        };
        metadata.checkpoints.push(checkpoint.clone());
        metadata.current = checkpoint_id.clone();
        metadata.updated_at = now;
        if let Err(e) = self.save_metadata(&metadata) {
            let _ = fs::remove_file(&archive_path);
            return Err(e);
        }

        if let Err(e) = self.storage_recount_locked(username, site_id, source_root) {
            warn!(username, site_id, error = %e, "storage recount after checkpoint failed");
        }

        info!(username, site_id, checkpoint = %checkpoint_id, size = file_size, "checkpoint created");
        Ok(checkpoint)
    }

    // -------------------------------------------------------------------------
    // Checkout
    // -------------------------------------------------------------------------

    /// Restores `target_root` from a checkpoint and moves `current` to it.
    /// No new checkpoint is created.
    pub fn checkout(
        &self,
        username: &str,
        site_id: &str,
        checkpoint_id: &str,
        target_root: &Path,
    ) -> Result<()> {
        let lock = self.site_lock(username, site_id);
        let _guard = lock.lock().expect("site lock poisoned");
        self.checkout_locked(username, site_id, checkpoint_id, target_root)
    }

    pub(crate) fn checkout_locked(
        &self,
        username: &str,
        site_id: &str,
        checkpoint_id: &str,
        target_root: &Path,
    ) -> Result<()> {
        let mut metadata = self.load_metadata(username, site_id)?;
        if !metadata.checkpoints.iter().any(|c| c.id == checkpoint_id) {
            return Err(Error::CheckpointMissing {
                id: checkpoint_id.to_string(),
            });
        }

        let archive_path = self.archive_path(username, site_id, checkpoint_id);
        if !archive_path.exists() {
            return Err(Error::CheckpointMissing {
                id: checkpoint_id.to_string(),
            });
        }

        if target_root.exists() {
            fs::remove_dir_all(target_root)?;
        }
        fs::create_dir_all(target_root)?;

        let file = File::open(&archive_path)?;
        extract::extract_tar_stream(GzDecoder::new(file), target_root)?;

        metadata.current = checkpoint_id.to_string();
        metadata.updated_at = Utc::now();
        self.save_metadata(&metadata)?;

        if let Err(e) = self.storage_recount_locked(username, site_id, target_root) {
            warn!(username, site_id, error = %e, "storage recount after checkout failed");
        }

        info!(username, site_id, checkpoint = checkpoint_id, "checked out checkpoint");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Delete
    // -------------------------------------------------------------------------

    /// Removes a checkpoint record and its archive. The currently active
    /// checkpoint is refused.
    pub fn delete(&self, username: &str, site_id: &str, checkpoint_id: &str) -> Result<()> {
        let lock = self.site_lock(username, site_id);
        let _guard = lock.lock().expect("site lock poisoned");

        let mut metadata = self.load_metadata(username, site_id)?;
        if metadata.current == checkpoint_id {
            return Err(Error::CurrentCheckpointUndeletable {
                id: checkpoint_id.to_string(),
            });
        }

        let before = metadata.checkpoints.len();
        metadata.checkpoints.retain(|c| c.id != checkpoint_id);
        if metadata.checkpoints.len() == before {
            return Err(Error::CheckpointMissing {
                id: checkpoint_id.to_string(),
            });
        }

        metadata.storage_usage = None;
        metadata.updated_at = Utc::now();
        self.save_metadata(&metadata)?;

        let archive_path = self.archive_path(username, site_id, checkpoint_id);
        match fs::remove_file(&archive_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(archive = %archive_path.display(), error = %e, "failed to remove checkpoint archive"),
        }

        info!(username, site_id, checkpoint = checkpoint_id, "checkpoint deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // List / Get
    // -------------------------------------------------------------------------

    /// Metadata with checkpoints sorted newest first.
    pub fn list(&self, username: &str, site_id: &str) -> Result<SiteCheckpointMetadata> {
        let mut metadata = self.load_metadata(username, site_id)?;
        metadata
            .checkpoints
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(metadata)
    }

    /// One checkpoint record.
    pub fn get(&self, username: &str, site_id: &str, checkpoint_id: &str) -> Result<Checkpoint> {
        self.load_metadata(username, site_id)?
            .checkpoints
            .into_iter()
            .find(|c| c.id == checkpoint_id)
            .ok_or_else(|| Error::CheckpointMissing {
                id: checkpoint_id.to_string(),
            })
    }

    // -------------------------------------------------------------------------
    // Storage accounting
    // -------------------------------------------------------------------------

    /// Walks the live root and the checkpoint archives, refreshing the
    /// cached usage summary in metadata.
    pub fn storage_recount(&self, username: &str, site_id: &str, root_dir: &Path) -> Result<()> {
        let lock = self.site_lock(username, site_id);
        let _guard = lock.lock().expect("site lock poisoned");
        self.storage_recount_locked(username, site_id, root_dir)
    }

    pub(crate) fn storage_recount_locked(
        &self,
        username: &str,
        site_id: &str,
        root_dir: &Path,
    ) -> Result<()> {
        let mut metadata = self.load_metadata(username, site_id)?;

        let (deployed_size, file_count) = if root_dir.exists() {
            directory_size(root_dir)
        } else {
            (0, 0)
        };
        let (checkpoints_size, checkpoint_count) = self.checkpoints_usage(username, site_id);

        let total_size = deployed_size + checkpoints_size;
        metadata.storage_usage = Some(DiskUsage {
            deployed_size,
            checkpoints_size,
            total_size,
            deployed_size_h: format_bytes(deployed_size),
            checkpoints_size_h: format_bytes(checkpoints_size),
            total_size_h: format_bytes(total_size),
            file_count,
            checkpoint_count,
        });
        metadata.updated_at = Utc::now();
        self.save_metadata(&metadata)
    }

    /// Cached usage summary; default (all-zero) when never counted.
    pub fn storage_usage(&self, username: &str, site_id: &str) -> Result<DiskUsage> {
        Ok(self
            .load_metadata(username, site_id)?
            .storage_usage
            .unwrap_or_default())
    }

    /// Total bytes and count of checkpoint archives for one site.
    fn checkpoints_usage(&self, username: &str, site_id: &str) -> (u64, u64) {
        let dir = self.checkpoints_dir(username, site_id);
        if !dir.exists() {
            return (0, 0);
        }

        let mut total = 0u64;
        let mut count = 0u64;
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("gz") {
                    if let Ok(meta) = entry.metadata() {
                        if meta.is_file() {
                            total += meta.len();
                            count += 1;
                        }
                    }
                }
            }
        }
        (total, count)
    }

    // -------------------------------------------------------------------------
    // Site teardown
    // -------------------------------------------------------------------------

    /// Removes all checkpoint data for a site (metadata and archives).
    /// Called when a site is deleted from the registry.
    pub fn remove_site_data(&self, username: &str, site_id: &str) -> Result<()> {
        let lock = self.site_lock(username, site_id);
        let _guard = lock.lock().expect("site lock poisoned");

        let dir = self.site_dir(username, site_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // -------------------------------------------------------------------------
    // Metadata persistence
    // -------------------------------------------------------------------------

    fn load_metadata(&self, username: &str, site_id: &str) -> Result<SiteCheckpointMetadata> {
        let path = self.metadata_path(username, site_id);
        if !path.exists() {
            return Ok(SiteCheckpointMetadata {
                site_id: site_id.to_string(),
                username: username.to_string(),
                current: String::new(),
                checkpoints: Vec::new(),
                storage_usage: None,
                updated_at: Utc::now(),
            });
        }

        let data = fs::read(&path).map_err(|e| Error::Checkpoint {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        serde_json::from_slice(&data).map_err(|e| Error::Checkpoint {
            reason: format!("failed to parse {}: {}", path.display(), e),
        })
    }

    fn save_metadata(&self, metadata: &SiteCheckpointMetadata) -> Result<()> {
        let path = self.metadata_path(&metadata.username, &metadata.site_id);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let data = serde_json::to_vec_pretty(metadata)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::Checkpoint {
            reason: format!("failed to create temp metadata file: {}", e),
        })?;
        tmp.write_all(&data).map_err(|e| Error::Checkpoint {
            reason: format!("failed to write metadata: {}", e),
        })?;
        tmp.as_file().sync_all().map_err(|e| Error::Checkpoint {
            reason: format!("failed to sync metadata: {}", e),
        })?;
        tmp.persist(&path).map_err(|e| Error::Checkpoint {
            reason: format!("failed to replace {}: {}", path.display(), e.error),
        })?;
        Ok(())
    }
}

// =============================================================================
// Directory walking, hashing, packing
// =============================================================================

enum WalkEntry {
    Dir { abs: PathBuf, rel: String },
    File { abs: PathBuf, rel: String },
}

/// Collects a directory tree with entries sorted by name at every level.
/// Relative paths are slash-separated. Symlinks are not followed (live
/// trees cannot contain them; extraction forbids them).
fn walk_sorted(root: &Path) -> Result<Vec<WalkEntry>> {
    let mut out = Vec::new();
    walk_sorted_inner(root, "", &mut out)?;
    Ok(out)
}

fn walk_sorted_inner(dir: &Path, prefix: &str, out: &mut Vec<WalkEntry>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let rel = if prefix.is_empty() {
            name.into_owned()
        } else {
            format!("{}/{}", prefix, name)
        };
        let abs = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            out.push(WalkEntry::Dir {
                abs: abs.clone(),
                rel: rel.clone(),
            });
            walk_sorted_inner(&abs, &rel, out)?;
        } else if file_type.is_file() {
            out.push(WalkEntry::File { abs, rel });
        }
    }
    Ok(())
}

/// Streams `{relative_path || file_bytes}` for every file under `root`
/// through SHA-256, in sorted walk order, and returns the hex digest.
pub fn hash_directory(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    for entry in walk_sorted(root)? {
        let WalkEntry::File { abs, rel } = entry else {
            continue;
        };
        hasher.update(rel.as_bytes());

        // A file that vanished or turned unreadable mid-walk is skipped
        // rather than failing the whole checkpoint.
        let Ok(mut file) = File::open(&abs) else {
            continue;
        };
        loop {
            let n = file.read(&mut buf).map_err(|e| Error::Checkpoint {
                reason: format!("failed to hash {}: {}", abs.display(), e),
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Packs `source` into a gzip-compressed tar at `target`, entry names
/// slash-separated and relative to `source`.
fn pack_directory(source: &Path, target: &Path) -> Result<()> {
    let file = File::create(target).map_err(|e| Error::Checkpoint {
        reason: format!("failed to create {}: {}", target.display(), e),
    })?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let result = (|| -> Result<()> {
        for entry in walk_sorted(source)? {
            match entry {
                WalkEntry::Dir { abs, rel } => {
                    builder.append_dir(&rel, &abs).map_err(|e| Error::Checkpoint {
                        reason: format!("failed to pack directory {}: {}", rel, e),
                    })?;
                }
                WalkEntry::File { abs, rel } => {
                    builder
                        .append_path_with_name(&abs, &rel)
                        .map_err(|e| Error::Checkpoint {
                            reason: format!("failed to pack file {}: {}", rel, e),
                        })?;
                }
            }
        }

        let encoder = builder.into_inner().map_err(|e| Error::Checkpoint {
            reason: format!("failed to finish archive: {}", e),
        })?;
        encoder.finish().map_err(|e| Error::Checkpoint {
            reason: format!("failed to finish compression: {}", e),
        })?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(target);
    }
    result
}

/// Total bytes and file count under `path`. Unreadable entries are skipped
/// so one bad file cannot poison the stats.
fn directory_size(path: &Path) -> (u64, u64) {
    let mut total = 0u64;
    let mut count = 0u64;

    let Ok(entries) = fs::read_dir(path) else {
        return (0, 0);
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            let (t, c) = directory_size(&entry.path());
            total += t;
            count += c;
        } else if file_type.is_file() {
            if let Ok(meta) = entry.metadata() {
                total += meta.len();
                count += 1;
            }
        }
    }
    (total, count)
}
