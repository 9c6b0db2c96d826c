//! Durable site registry.
//!
//! All sites across all tenants live in a single JSON array at
//! `{data_dir}/sites.json`. The file is the source of truth: every mutation
//! reloads it, applies the change, and writes it back, so concurrent writers
//! always see each other's rows. A store-local read/write lock serializes
//! mutators; readers share.
//!
//! Writes are crash-safe: the new document is written to a temp file in the
//! same directory, fsynced, and renamed over the old one.

use crate::constants::SITES_FILE;
use crate::error::{Error, Result};
use crate::site::Site;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// File-backed site registry.
pub struct SiteStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl SiteStore {
    /// Creates a store over `{data_dir}/sites.json`. The file is created
    /// lazily on first write.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SITES_FILE),
            lock: RwLock::new(()),
        }
    }

    /// Registry file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all sites. A missing file is an empty registry; a malformed
    /// file is an error.
    pub fn load(&self) -> Result<Vec<Site>> {
        let _guard = self.lock.read().expect("site store lock poisoned");
        self.load_unlocked()
    }

    /// Loads the sites belonging to one tenant.
    pub fn load_for_user(&self, username: &str) -> Result<Vec<Site>> {
        let mut sites = self.load()?;
        sites.retain(|s| s.username == username);
        Ok(sites)
    }

    /// Fetches a single site by `(username, id)`.
    pub fn get(&self, username: &str, id: &str) -> Result<Site> {
        self.load()?
            .into_iter()
            .find(|s| s.username == username && s.id == id)
            .ok_or_else(|| Error::SiteNotFound {
                username: username.to_string(),
                id: id.to_string(),
            })
    }

    /// Replaces the whole registry.
    pub fn save(&self, sites: &[Site]) -> Result<()> {
        let _guard = self.lock.write().expect("site store lock poisoned");
        self.save_unlocked(sites)
    }

    /// Appends a site. Rejects a duplicate `(username, id)` and a domain
    /// already bound to any site.
    pub fn add(&self, site: &Site) -> Result<()> {
        let _guard = self.lock.write().expect("site store lock poisoned");

        let mut sites = self.load_unlocked()?;
        for existing in &sites {
            if existing.username == site.username && existing.id == site.id {
                return Err(Error::SiteIdExists {
                    username: site.username.clone(),
                    id: site.id.clone(),
                });
            }
            if existing.domain == site.domain {
                return Err(Error::DomainTaken {
                    domain: site.domain.clone(),
                });
            }
        }

        sites.push(site.clone());
        self.save_unlocked(&sites)?;
        debug!(username = %site.username, id = %site.id, domain = %site.domain, "site added to registry");
        Ok(())
    }

    /// Removes the unique `(username, id)` match.
    pub fn remove_for_user(&self, username: &str, id: &str) -> Result<()> {
        let _guard = self.lock.write().expect("site store lock poisoned");

        let mut sites = self.load_unlocked()?;
        let before = sites.len();
        sites.retain(|s| !(s.username == username && s.id == id));
        if sites.len() == before {
            return Err(Error::SiteNotFound {
                username: username.to_string(),
                id: id.to_string(),
            });
        }

        self.save_unlocked(&sites)?;
        debug!(username, id, "site removed from registry");
        Ok(())
    }

    /// Replaces the element matching `(username, id)`. A domain change is
    /// re-checked against every other site so no update can break global
    /// domain uniqueness.
    pub fn update(&self, site: &Site) -> Result<()> {
        let _guard = self.lock.write().expect("site store lock poisoned");

        let mut sites = self.load_unlocked()?;
        for existing in &sites {
            if existing.domain == site.domain
                && !(existing.username == site.username && existing.id == site.id)
            {
                return Err(Error::DomainTaken {
                    domain: site.domain.clone(),
                });
            }
        }

        let slot = sites
            .iter_mut()
            .find(|s| s.username == site.username && s.id == site.id)
            .ok_or_else(|| Error::SiteNotFound {
                username: site.username.clone(),
                id: site.id.clone(),
            })?;
        *slot = site.clone();

        self.save_unlocked(&sites)
    }

    fn load_unlocked(&self) -> Result<Vec<Site>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let data = fs::read(&self.path).map_err(|e| Error::Store {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;
        serde_json::from_slice(&data).map_err(|e| Error::Store {
            reason: format!("failed to parse {}: {}", self.path.display(), e),
        })
    }

    fn save_unlocked(&self, sites: &[Site]) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| Error::Store {
            reason: format!("failed to create {}: {}", dir.display(), e),
        })?;

        let data = serde_json::to_vec_pretty(sites)?;

        // Temp file in the same directory keeps the final rename atomic.
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::Store {
            reason: format!("failed to create temp registry file: {}", e),
        })?;
        tmp.write_all(&data).map_err(|e| Error::Store {
            reason: format!("failed to write registry: {}", e),
        })?;
        tmp.as_file().sync_all().map_err(|e| Error::Store {
            reason: format!("failed to sync registry: {}", e),
        })?;
        tmp.persist(&self.path).map_err(|e| Error::Store {
            reason: format!("failed to replace {}: {}", self.path.display(), e.error),
        })?;

        Ok(())
    }
}
