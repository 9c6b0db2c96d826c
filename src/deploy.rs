//! Deployment orchestrator.
//!
//! Binds the extractor, normalizer, checkpoint engine, and atomic swapper
//! into the public deploy contract: given a spooled upload, extract it to a
//! staging directory, snapshot the outgoing live root, and swap the new tree
//! into place.
//!
//! Failure semantics: a checkpoint failure is logged and the deploy
//! proceeds (availability over durability — the deploy just has no rollback
//! point); a swap failure is fatal and surfaces after the backup restore has
//! been attempted. All staging directories are cleaned up on every exit
//! path.

use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::error::Result;
use crate::extract::extract_archive;
use crate::normalize::normalize_directory;
use crate::store::SiteStore;
use crate::swap::atomic_replace_directory;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successful deploy.
#[derive(Debug)]
pub struct DeployOutcome {
    /// Snapshot of the tree that was replaced; `None` on a first deploy or
    /// when checkpoint creation failed non-fatally.
    pub checkpoint: Option<Checkpoint>,
}

/// Runs the deploy pipeline. All collaborators are passed in explicitly;
/// there is no process-wide state.
pub struct DeploymentOrchestrator {
    store: Arc<SiteStore>,
    checkpoints: Arc<CheckpointManager>,
    sites_dir: PathBuf,
}

impl DeploymentOrchestrator {
    pub fn new(store: Arc<SiteStore>, checkpoints: Arc<CheckpointManager>, sites_dir: PathBuf) -> Self {
        Self {
            store,
            checkpoints,
            sites_dir,
        }
    }

    /// Deploys a spooled upload to a site.
    ///
    /// `archive_path` is the uploaded archive on local disk;
    /// `original_filename` carries the suffix that selects the extraction
    /// format. The site must already exist in the registry.
    pub fn deploy(
        &self,
        username: &str,
        site_id: &str,
        archive_path: &Path,
        original_filename: &str,
    ) -> Result<DeployOutcome> {
        let site = self.store.get(username, site_id)?;
        let root_dir = site.root_dir(&self.sites_dir);

        let extract_dir = tempfile::Builder::new()
            .prefix("deploy-extract-")
            .tempdir()?;

        extract_archive(archive_path, original_filename, extract_dir.path())?;

        let normalized = normalize_directory(extract_dir.path())?;
        // When normalization produced a fresh staging dir, it is ours to
        // clean up; after a successful swap the rename makes this a no-op.
        let staging_guard = if normalized != extract_dir.path() {
            Some(RemoveOnDrop(normalized.clone()))
        } else {
            None
        };

        // One site deploys at a time: the lock spans snapshot, swap, and
        // recount so checkpoint state always matches the live tree.
        let lock = self.checkpoints.site_lock(username, site_id);
        let _guard = lock.lock().expect("site lock poisoned");

        let mut checkpoint = None;
        if root_dir.exists() {
            match self
                .checkpoints
                .create_locked(username, site_id, &root_dir, original_filename)
            {
                Ok(cp) => checkpoint = Some(cp),
                Err(e) => {
                    warn!(username, site_id, error = %e, "checkpoint creation failed, deploying without a rollback point");
                }
            }
        }

        atomic_replace_directory(&root_dir, &normalized)?;
        drop(staging_guard);

        // Without a fresh checkpoint nothing recounted usage for the new
        // tree; do it here so the cached stats stay truthful.
        if checkpoint.is_none() {
            if let Err(e) = self
                .checkpoints
                .storage_recount_locked(username, site_id, &root_dir)
            {
                warn!(username, site_id, error = %e, "storage recount after deploy failed");
            }
        }

        info!(
            username,
            site_id,
            upload = original_filename,
            checkpointed = checkpoint.is_some(),
            "site deployed"
        );
        Ok(DeployOutcome { checkpoint })
    }

    /// Restores a site's live root from a checkpoint.
    pub fn checkout(&self, username: &str, site_id: &str, checkpoint_id: &str) -> Result<()> {
        let site = self.store.get(username, site_id)?;
        let root_dir = site.root_dir(&self.sites_dir);
        self.checkpoints
            .checkout(username, site_id, checkpoint_id, &root_dir)
    }

    /// Live root for a site, derived from configuration.
    pub fn site_root(&self, username: &str, site_id: &str) -> PathBuf {
        self.sites_dir.join(username).join(site_id)
    }
}

/// Removes a directory tree on drop. Used for staging directories whose
/// lifetime ends inside the pipeline regardless of outcome.
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if self.0.exists() {
            let _ = fs::remove_dir_all(&self.0);
        }
    }
}
